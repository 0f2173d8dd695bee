pub mod analysis;
pub mod xirr;
