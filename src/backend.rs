pub mod backend;
pub mod reorder_buffer;
pub mod reservation_station;
pub mod register_alias_table;
pub mod ring_buffer;
pub mod timing;
