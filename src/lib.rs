pub mod annotate;
pub mod card;
pub mod detail;
pub mod dom;
pub mod glossary;
pub mod matcher;
pub mod news;
pub mod normalize;
pub mod search;
pub mod splice;
#[cfg(feature = "web")]
pub mod web;

pub use annotate::{Annotator, MARKER_CLASS, Marker};
pub use card::{Card, CardController, DETAIL_PATH};
pub use detail::DetailPage;
pub use glossary::{Glossary, GlossaryError, NewsLink, TermRef};
pub use matcher::{TermMatcher, build_matchers};
pub use news::{NEWS_LIMIT, NewsCache};
pub use normalize::normalize;
pub use search::{Debouncer, SEARCH_DEBOUNCE, SearchSession};
pub use splice::{Fragment, splice};
