pub mod pypi;

pub use pypi::PyPiRepository;
