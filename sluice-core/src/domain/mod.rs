//! Domain values shared by the scheduler and the client.

pub mod priority;
pub mod url;
