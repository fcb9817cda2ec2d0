use marquee_booking::BookingCoordinator;
use marquee_core::identity::CredentialVerifier;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub coordinator: Arc<BookingCoordinator>,
    pub verifier: Arc<dyn CredentialVerifier>,
}

impl AppState {
    pub fn new(coordinator: BookingCoordinator, verifier: Arc<dyn CredentialVerifier>) -> Self {
        Self {
            coordinator: Arc::new(coordinator),
            verifier,
        }
    }
}
