// Core modules implementing table storage, sorted projections, and error modeling.
pub mod error;
pub mod sorted;
pub mod table;
