/// The bounded slice of a document sent to the model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Excerpt {
    pub text: String,
    pub pages_used: usize,
    pub truncated: bool,
}

impl Excerpt {
    pub fn char_count(&self) -> usize {
        self.text.chars().count()
    }
}

/// Join the first `max_pages` non-empty pages under `[Page N]` markers, then
/// cut to at most `max_chars` characters.
pub fn bound_excerpt(pages: &[String], max_pages: usize, max_chars: usize) -> Excerpt {
    let mut sections = Vec::new();
    let mut pages_used = 0;
    for (i, page) in pages.iter().take(max_pages).enumerate() {
        let page = page.trim();
        if page.is_empty() {
            continue;
        }
        sections.push(format!("[Page {}]\n{page}", i + 1));
        pages_used += 1;
    }
    let joined = sections.join("\n\n");

    match joined.char_indices().nth(max_chars) {
        Some((cut, _)) => Excerpt {
            text: joined[..cut].to_string(),
            pages_used,
            truncated: true,
        },
        None => Excerpt {
            text: joined,
            pages_used,
            truncated: false,
        },
    }
}
