pub mod device;
pub mod error;
pub mod melody;
pub mod player;

pub use error::Error;
pub use melody::Session;
pub use player::Player;
