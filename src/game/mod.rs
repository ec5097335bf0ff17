// Quiz module
// Riddle scales and the game engine

pub mod scales;
pub mod session;

pub use scales::{note_pool, Scale};
pub use session::{Attempt, QuizConfig, QuizEngine, QuizSnapshot, QuizStage};
