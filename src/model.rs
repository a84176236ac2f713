use std::collections::BTreeMap;

/// Name of the ODF member holding the document body.
pub const CONTENT_MEMBER: &str = "content.xml";

/// Placeholder name -> replacement text. Ordered so reports are stable.
pub type Values = BTreeMap<String, String>;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum MissingPolicy {
    /// Leave the placeholder text in the output as-is.
    #[default]
    Keep,
    /// Refuse to write any output.
    Fail,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PlaceholderSyntax {
    pub open: String,
    pub close: String,
}

impl Default for PlaceholderSyntax {
    fn default() -> Self {
        PlaceholderSyntax {
            open: "{{".into(),
            close: "}}".into(),
        }
    }
}

/// Edits are located against the template as loaded, so they must not
/// touch the same text: populating one bookmark twice is an error.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BookmarkEdit {
    /// Replace the bookmarked range (or fill a collapsed bookmark) with text.
    Populate { bookmark: String, text: String },
    /// Insert a new paragraph after the one holding the bookmark.
    ParagraphAfter { bookmark: String, text: String },
}

#[derive(Clone, Debug)]
pub struct FillOptions {
    pub syntax: PlaceholderSyntax,
    pub missing: MissingPolicy,
    pub content_member: String,
    pub bookmarks: Vec<BookmarkEdit>,
}

impl Default for FillOptions {
    fn default() -> Self {
        FillOptions {
            syntax: PlaceholderSyntax::default(),
            missing: MissingPolicy::default(),
            content_member: CONTENT_MEMBER.into(),
            bookmarks: Vec::new(),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FillReport {
    pub substitutions: BTreeMap<String, usize>, // key -> occurrences replaced
    pub unfilled: Vec<String>,
    pub unused: Vec<String>,
}

impl FillReport {
    pub fn total_substitutions(&self) -> usize {
        self.substitutions.values().sum()
    }
}
