pub mod keywords;
pub mod lexer;
pub mod macros;
pub mod parser;
pub mod scanner;

pub use macros::MacroContext;
pub use parser::{FileFactory, PreProcessor};
pub use scanner::StructuralScanner;
