pub mod bounds;
pub mod element;
pub mod geometry;
pub mod hierarchy;
pub mod traits;
pub mod xml_tree;
pub mod xpath;
