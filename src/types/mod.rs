//! Type definitions for the scoring pipeline

pub mod applicant;
pub mod assessment;

pub use applicant::RawApplicantRecord;
pub use assessment::{RiskAssessment, RiskBand, RiskBandThresholds, RiskLabel};
