pub mod calculations;
pub mod gateway;
pub mod models;
pub mod validation;
pub mod wizard;

pub use gateway::{CouponSource, GatewayError, RegistrationGateway};
pub use models::*;
pub use wizard::{Confirmation, CouponOutcome, Wizard, WizardError};
