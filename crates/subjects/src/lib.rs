pub mod candidates;
pub mod distance;
pub mod index;
pub mod normalize;
pub mod phonex;
pub mod relation;
pub mod resolver;
pub mod schema;
pub mod scorer;
pub mod store;

pub use resolver::{ResolveInput, Resolver, ResolverOptions, ResolverStats};
pub use schema::{Alias, Subject, SubjectId};
pub use scorer::{MatchType, Resolution};
pub use store::{InMemorySubjectStore, StoreError, SubjectSource};
