// Bidirectional synchronization
//
// Hands conflicts reported by bisync to a human via an external merge tool.

pub mod resolver;

pub use resolver::ConflictResolver;
