pub mod log_bus;
