//! Collaborator flows built on the coordinator.
//!
//! Each flow reads guard state and writes its own records inside the
//! transaction it shares with the lifecycle change, so both commit or
//! neither does.

pub mod certificate;
pub mod field_work;
pub mod non_conformity;
pub mod payment;

pub use certificate::{find_certificate, issue_certificate, Certificate, IssuedCertificate};
pub use field_work::{
    declare_survey, finalize_survey, request_rework, start_survey, submit_checklist, upload_proof,
};
pub use payment::{
    find_payment, record_payment, settle_payment, Payment, PaymentStatus, SettledPayment,
};
