mod chords;
mod midi_importer;
mod model;
mod runner;
mod sink;
mod vis;

pub use chords::*;
pub use midi_importer::*;
pub use model::config::*;
pub use model::note::*;
pub use model::settings::*;
pub use model::theme::*;
pub use runner::*;
pub use sink::*;
pub use vis::*;
