pub mod bookings;
pub mod classes;
pub mod root;
pub mod webhooks;
