//! Wire message types exchanged with a venue

pub mod order;
