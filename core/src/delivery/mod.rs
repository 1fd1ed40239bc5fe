// Delivery tracking: status transitions driven by acks and read receipts

pub mod tracker;

pub use tracker::DeliveryTracker;
