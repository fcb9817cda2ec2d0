pub mod coordinator;
pub mod guard;

pub use coordinator::BookingCoordinator;
pub use guard::SeatLockGuard;
