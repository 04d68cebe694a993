pub mod loader;
pub mod schema;

pub use loader::{DataLoadError, GameData, InitialState, load_game_data};
