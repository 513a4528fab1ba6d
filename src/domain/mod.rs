pub mod booking;
pub mod class_session;
pub mod package;
pub mod transaction;
pub mod waitlist;

pub use booking::*;
pub use class_session::*;
pub use package::*;
pub use transaction::*;
pub use waitlist::*;
