pub mod booking;
pub mod money;
pub mod seat;
pub mod user;

pub use booking::{Booking, SeatReservation};
pub use seat::Seat;
pub use user::User;
