pub mod human_bytes;
