mod types;
mod error;
mod iupac;
mod fasta;
mod store;
mod digester;
mod thermo;
mod dimer;
mod scorer;
mod pair;
mod mispriming;
mod tiler;
mod pools;
mod scheme;
mod output;

pub use types::*;
pub use error::*;
pub use iupac::*;
pub use fasta::*;
pub use store::*;
pub use digester::*;
pub use thermo::*;
pub use dimer::*;
pub use scorer::*;
pub use pair::*;
pub use mispriming::*;
pub use tiler::*;
pub use pools::*;
pub use scheme::*;
pub use output::*;
