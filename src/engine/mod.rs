pub mod baseline;
pub mod policy;
pub mod responses;
pub mod threat;
