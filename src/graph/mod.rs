//! Reference graph: typed edges from pages to names, and queries over them

mod references;


pub use references::ReferenceGraph;
