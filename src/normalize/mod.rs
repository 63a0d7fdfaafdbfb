// src/normalize/mod.rs

pub mod decompose;
pub mod dicts;
pub mod text;

pub use decompose::{parse_name, NameStructure};
pub use text::{clean, is_cjk, normalize, tokenize};
