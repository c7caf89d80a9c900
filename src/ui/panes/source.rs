//! Source pane with the current stop highlighted
//!
//! Lines carrying a breakpoint get a marker in the gutter; the line the
//! session is stopped at gets an arrow and a highlighted background. A small
//! tokenizer colors C++ keywords, strings, numbers and comments.

use crate::ui::theme::DEFAULT_THEME;
use ratatui::{
    layout::Rect,
    style::{Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph},
    Frame,
};

fn highlight_source_code(line: &str) -> Vec<Span<'static>> {
    let mut spans = Vec::new();
    let mut current_word = String::new();
    let chars: Vec<(usize, char)> = line.char_indices().collect();
    let mut i = 0;

    while i < chars.len() {
        let (at, c) = chars[i];

        if c == '/' && chars.get(i + 1).is_some_and(|&(_, n)| n == '/') {
            flush_word(&mut spans, &mut current_word, false);
            spans.push(Span::styled(
                line[at..].to_string(),
                Style::default().fg(DEFAULT_THEME.comment),
            ));
            return spans;
        }

        if c == '"' {
            flush_word(&mut spans, &mut current_word, false);
            let mut end = i + 1;
            while end < chars.len() && chars[end].1 != '"' {
                end += if chars[end].1 == '\\' { 2 } else { 1 };
            }
            end = (end + 1).min(chars.len());
            let stop = chars.get(end).map_or(line.len(), |&(pos, _)| pos);
            spans.push(Span::styled(
                line[at..stop].to_string(),
                Style::default().fg(DEFAULT_THEME.string),
            ));
            i = end;
            continue;
        }

        if c == '#' && current_word.is_empty() && line[..at].trim().is_empty() {
            spans.push(Span::styled(
                line[at..].to_string(),
                Style::default().fg(DEFAULT_THEME.keyword),
            ));
            return spans;
        }

        if !c.is_alphanumeric() && c != '_' && c != ':' {
            flush_word(&mut spans, &mut current_word, c == '(');
            let style = match c {
                '{' | '}' | '(' | ')' | '[' | ']' => Style::default().fg(DEFAULT_THEME.primary),
                _ => Style::default().fg(DEFAULT_THEME.fg),
            };
            spans.push(Span::styled(c.to_string(), style));
            i += 1;
            continue;
        }

        current_word.push(c);
        i += 1;
    }

    flush_word(&mut spans, &mut current_word, false);
    spans
}

fn flush_word(spans: &mut Vec<Span<'static>>, word: &mut String, is_function: bool) {
    if !word.is_empty() {
        let style = keyword_style(word, is_function);
        spans.push(Span::styled(std::mem::take(word), style));
    }
}

fn keyword_style(word: &str, is_function: bool) -> Style {
    match word {
        "int" | "char" | "void" | "bool" | "long" | "unsigned" | "auto" => {
            Style::default().fg(DEFAULT_THEME.type_name)
        }
        "return" | "if" | "else" | "while" | "for" | "const" | "struct" | "class" => Style::default()
            .fg(DEFAULT_THEME.keyword)
            .add_modifier(Modifier::BOLD),
        w if w.starts_with("std::") || w.ends_with("_map") => {
            Style::default().fg(DEFAULT_THEME.type_name)
        }
        w if w.chars().all(|c| c.is_ascii_digit()) => Style::default().fg(DEFAULT_THEME.number),
        _ if is_function => Style::default().fg(DEFAULT_THEME.function),
        _ => Style::default().fg(DEFAULT_THEME.fg),
    }
}

/// Scroll state for the source pane
#[derive(Debug, Default)]
pub struct SourceScrollState {
    pub offset: usize,
    /// Row the current line is pinned to; set on first render
    pub target_line_row: Option<usize>,
}

pub struct SourceRenderData<'a> {
    pub source: &'a str,
    pub current_line: usize,
    pub breakpoints: &'a [usize],
}

pub fn render_source_pane(
    frame: &mut Frame,
    area: Rect,
    data: SourceRenderData,
    is_focused: bool,
    scroll_state: &mut SourceScrollState,
) {
    let block = Block::default()
        .title(" Source ")
        .borders(Borders::ALL)
        .border_style(super::border_style(is_focused));

    let lines: Vec<&str> = data.source.lines().collect();
    let total_lines = lines.len();
    let visible_height = area.height.saturating_sub(2).max(1) as usize;

    let target_row = scroll_state
        .target_line_row
        .unwrap_or(visible_height / 2)
        .min(visible_height.saturating_sub(1));
    scroll_state.target_line_row = Some(target_row);

    if data.current_line > 0 && data.current_line <= total_lines {
        let wanted = (data.current_line - 1).saturating_sub(target_row);
        scroll_state.offset = wanted.min(total_lines.saturating_sub(visible_height));
    }

    let visible_lines: Vec<Line> = lines
        .iter()
        .enumerate()
        .skip(scroll_state.offset)
        .take(visible_height)
        .map(|(idx, line)| {
            let line_num = idx + 1;
            let is_current = line_num == data.current_line;
            let gutter = if is_current {
                Span::styled(
                    "▶",
                    Style::default()
                        .fg(DEFAULT_THEME.secondary)
                        .add_modifier(Modifier::BOLD),
                )
            } else if data.breakpoints.contains(&line_num) {
                Span::styled("●", Style::default().fg(DEFAULT_THEME.breakpoint))
            } else {
                Span::raw(" ")
            };
            let num_style = if is_current {
                Style::default()
                    .fg(DEFAULT_THEME.secondary)
                    .add_modifier(Modifier::BOLD)
            } else {
                Style::default().fg(DEFAULT_THEME.comment)
            };

            let mut spans = vec![gutter, Span::styled(format!("{:4} ", line_num), num_style)];
            let mut content = highlight_source_code(line);
            if is_current {
                for span in &mut content {
                    span.style = span
                        .style
                        .patch(Style::default().bg(DEFAULT_THEME.current_line_bg));
                }
            }
            spans.extend(content);
            Line::from(spans)
        })
        .collect();

    frame.render_widget(Paragraph::new(visible_lines).block(block), area);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(spans: &[Span]) -> String {
        spans.iter().map(|s| s.content.as_ref()).collect()
    }

    #[test]
    fn test_highlighting_keeps_the_text() {
        for line in [
            "  si[\"zero\"] = 0; // Set break point at this line.",
            "#include <map>",
            "int thefoo_rw(int arg = 1) {",
            "  ss[\"ciao\"] = \"hello\";",
        ] {
            assert_eq!(text(&highlight_source_code(line)), line);
        }
    }

    #[test]
    fn test_comment_is_one_span() {
        let spans = highlight_source_code("  ii.clear(); // Set break point at this line.");
        let last = spans.last().unwrap();
        assert_eq!(last.content, "// Set break point at this line.");
        assert_eq!(last.style.fg, Some(DEFAULT_THEME.comment));
    }
}
