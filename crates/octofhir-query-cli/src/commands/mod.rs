pub mod columns;
pub mod search;
pub mod table;
