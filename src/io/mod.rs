/// Per-partition output recording.
pub mod export;
