pub mod comment_tree;
pub mod gravatar;
pub mod stylesheets;

pub use comment_tree::{CommentAuthor, CommentNode, CommentTreeService};
pub use gravatar::gravatar_hash;
pub use stylesheets::StylesheetService;
