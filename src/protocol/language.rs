//! Best-effort removal of trailing text written in the wrong language.
//!
//! Models asked for an English prompt sometimes append a Chinese
//! translation (and vice versa). The filter only ever returns a prefix of
//! its input, and never strips everything written in the requested script.

use super::canonical::OutputLanguage;

fn is_cjk(c: char) -> bool {
    matches!(
        u32::from(c),
        0x3000..=0x303F | 0x3400..=0x4DBF | 0x4E00..=0x9FFF | 0xF900..=0xFAFF | 0xFF00..=0xFFEF
    )
}

fn is_cjk_ideograph(c: char) -> bool {
    matches!(
        u32::from(c),
        0x3400..=0x4DBF | 0x4E00..=0x9FFF | 0xF900..=0xFAFF
    )
}

fn is_undesired(c: char, keep: OutputLanguage) -> bool {
    match keep {
        OutputLanguage::En => is_cjk(c),
        OutputLanguage::Zh => c.is_ascii_alphabetic(),
    }
}

fn has_desired(text: &str, keep: OutputLanguage) -> bool {
    match keep {
        OutputLanguage::En => text.chars().any(|c| c.is_ascii_alphabetic()),
        OutputLanguage::Zh => text.chars().any(is_cjk_ideograph),
    }
}

fn starts_undesired(line: &str, keep: OutputLanguage) -> bool {
    line.trim_start()
        .chars()
        .next()
        .is_some_and(|c| is_undesired(c, keep))
}

/// Cut `text` at the first paragraph break followed by undesired-script
/// content, then drop trailing lines that start with the undesired script.
#[must_use]
pub fn filter_language(text: &str, keep: OutputLanguage) -> &str {
    let text = cut_at_foreign_paragraph(text, keep);
    strip_foreign_trailing_lines(text, keep)
}

fn cut_at_foreign_paragraph(text: &str, keep: OutputLanguage) -> &str {
    let mut offset = 0;
    let mut content_end = 0;
    let mut after_blank = false;
    for line in text.split_inclusive('\n') {
        let start = offset;
        offset += line.len();
        if line.trim().is_empty() {
            // Only a line terminated by '\n' counts as a blank separator.
            if content_end > 0 && line.ends_with('\n') {
                after_blank = true;
            }
            continue;
        }
        if after_blank
            && starts_undesired(line, keep)
            && has_desired(&text[..content_end], keep)
        {
            return &text[..content_end];
        }
        after_blank = false;
        content_end = start + line.trim_end().len();
    }
    text
}

fn strip_foreign_trailing_lines(mut text: &str, keep: OutputLanguage) -> &str {
    loop {
        let body = text.trim_end();
        let line_start = body.rfind('\n').map_or(0, |index| index + 1);
        if line_start == 0 || !starts_undesired(&body[line_start..], keep) {
            return text;
        }
        let kept = body[..line_start].trim_end();
        if !has_desired(kept, keep) {
            return text;
        }
        text = kept;
    }
}
