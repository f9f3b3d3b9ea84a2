//! Locating a Loom script inside a host file.

/// A script block cut out of its host, with the host lines that precede it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EmbeddedScript<'a> {
    pub source: &'a str,
    /// Host line of the script's first line, minus one. Pass it straight to
    /// the parser so positions come out absolute.
    pub line_offset: usize,
}

const OPEN_TAG: &str = "<script";
const CLOSE_TAG: &str = "</script>";

/// Find the first `<script lang="loom">` … `</script>` block.
///
/// Other script blocks are skipped. Returns `None` if there is no Loom block
/// or it is never closed.
pub fn extract_script(host: &str) -> Option<EmbeddedScript<'_>> {
    let mut from = 0;
    while let Some(rel) = host.get(from..)?.find(OPEN_TAG) {
        let tag_start = from + rel;
        let tag_end = tag_start + host.get(tag_start..)?.find('>')?;
        let attrs = host.get(tag_start + OPEN_TAG.len()..tag_end)?;
        let body_start = tag_end + 1;
        if is_loom_tag(attrs) {
            let body_len = host.get(body_start..)?.find(CLOSE_TAG)?;
            let source = host.get(body_start..body_start + body_len)?;
            let line_offset = host.get(..body_start)?.matches('\n').count();
            log::debug!("embedded script at host line {}", line_offset + 1);
            return Some(EmbeddedScript { source, line_offset });
        }
        from = body_start;
    }
    None
}

fn is_loom_tag(attrs: &str) -> bool {
    // `<scripts>` or similar is not a script tag.
    if !attrs.is_empty() && !attrs.starts_with(char::is_whitespace) {
        return false;
    }
    attrs
        .split_whitespace()
        .any(|attr| matches!(attr, "lang=\"loom\"" | "lang='loom'" | "lang=loom"))
}
