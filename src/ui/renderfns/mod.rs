pub mod footer;
pub mod header;
pub mod utils;

pub use footer::{draw_banner, draw_footer};
pub use header::{draw_header, HeaderContext};
pub use utils::{
  contrast_color, days_since, due_label, format_date, group_reactions, label_color,
  reaction_emoji, toggle_text, truncate,
};
