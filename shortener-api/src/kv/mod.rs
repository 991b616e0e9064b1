pub mod memory_kv;
