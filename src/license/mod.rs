pub mod authority;
pub mod key;
pub mod lifecycle;

pub use authority::LicenseAuthority;
pub use lifecycle::{InvalidReason, LicenseTerms, LicenseValidation};
