//! Background consumers of the module event bus.

pub mod module_event_worker;
