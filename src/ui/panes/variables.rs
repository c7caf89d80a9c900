//! Variables pane
//!
//! Shows the selected frame's locals, one row per variable. An expanded
//! variable is followed by one row per synthetic child; a child's own members
//! are folded into its row, the way a pair prints as `(first = .., second = ..)`.

use crate::render::{format_inline, ValueNode};
use crate::ui::theme::DEFAULT_THEME;
use ratatui::{
    layout::Rect,
    style::{Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, List, ListItem, Paragraph},
    Frame,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Expander {
    Leaf,
    Collapsed,
    Expanded,
}

/// One precomputed line of the pane
#[derive(Debug, Clone, PartialEq)]
pub struct VariableRow {
    /// Index of the top-level variable this row belongs to
    pub owner: usize,
    pub depth: usize,
    pub name: String,
    pub type_name: Option<String>,
    pub value: String,
    pub expander: Expander,
}

/// Rows for one top-level variable
pub fn variable_rows(owner: usize, node: &ValueNode, expanded: bool) -> Vec<VariableRow> {
    let expander = if !node.might_have_children && node.children.is_empty() {
        Expander::Leaf
    } else if expanded {
        Expander::Expanded
    } else {
        Expander::Collapsed
    };
    let value = if expanded {
        node.headline()
            .map(str::to_string)
            .or_else(|| node.error.as_ref().map(|e| format!("<{}>", e)))
            .unwrap_or_default()
    } else {
        format_inline(node)
    };

    let mut rows = vec![VariableRow {
        owner,
        depth: 0,
        name: node.name.clone(),
        type_name: Some(node.type_name.clone()),
        value,
        expander,
    }];
    if !expanded {
        return rows;
    }

    let child_row = |name: &str, value: String| VariableRow {
        owner,
        depth: 1,
        name: name.to_string(),
        type_name: None,
        value,
        expander: Expander::Leaf,
    };
    rows.extend(
        node.children
            .iter()
            .map(|child| child_row(&child.name, format_inline(child))),
    );
    if node.elided > 0 {
        rows.push(child_row("...", format!("{} more", node.elided)));
    }
    if let Some(err) = &node.error {
        rows.push(child_row("error", format!("<{}>", err)));
    }
    rows
}

/// Style a rendered value by what it looks like
fn value_style(value: &str) -> Style {
    let color = if value.starts_with('<') {
        DEFAULT_THEME.error
    } else if value.starts_with('"') || value.starts_with('\'') {
        DEFAULT_THEME.string
    } else if value.starts_with("size=") || value == "end" {
        DEFAULT_THEME.summary
    } else if value.starts_with("0x") || value.parse::<i64>().is_ok() || value == "nullptr" {
        DEFAULT_THEME.number
    } else {
        DEFAULT_THEME.fg
    };
    Style::default().fg(color)
}

/// Scroll state for the variables pane
#[derive(Debug, Default)]
pub struct VariablesScrollState {
    pub offset: usize,
}

pub struct VariablesRenderData<'a> {
    pub rows: &'a [VariableRow],
    pub selected: usize,
    pub function: &'a str,
    pub frame_index: usize,
}

pub fn render_variables_pane(
    frame: &mut Frame,
    area: Rect,
    data: VariablesRenderData,
    is_focused: bool,
    scroll_state: &mut VariablesScrollState,
) {
    let block = Block::default()
        .title(format!(" Variables: frame #{} {} ", data.frame_index, data.function))
        .borders(Borders::ALL)
        .border_style(super::border_style(is_focused));

    if data.rows.is_empty() {
        let paragraph = Paragraph::new("(no variables)")
            .block(block)
            .style(Style::default().fg(DEFAULT_THEME.comment));
        frame.render_widget(paragraph, area);
        return;
    }

    let visible_height = area.height.saturating_sub(2).max(1) as usize;
    // Keep the selected variable's first row on screen
    if let Some(first) = data.rows.iter().position(|r| r.owner == data.selected) {
        if first < scroll_state.offset {
            scroll_state.offset = first;
        } else if first >= scroll_state.offset + visible_height {
            scroll_state.offset = first + 1 - visible_height;
        }
    }
    scroll_state.offset = scroll_state
        .offset
        .min(data.rows.len().saturating_sub(visible_height));

    let items: Vec<ListItem> = data
        .rows
        .iter()
        .skip(scroll_state.offset)
        .take(visible_height)
        .map(|row| {
            let marker = match row.expander {
                Expander::Leaf => "  ",
                Expander::Collapsed => "▸ ",
                Expander::Expanded => "▾ ",
            };
            let mut spans = vec![
                Span::raw("  ".repeat(row.depth)),
                Span::styled(marker, Style::default().fg(DEFAULT_THEME.comment)),
            ];
            if let Some(ty) = &row.type_name {
                spans.push(Span::styled(
                    format!("({}) ", ty),
                    Style::default().fg(DEFAULT_THEME.type_name),
                ));
            }
            spans.push(Span::styled(
                row.name.clone(),
                Style::default()
                    .fg(DEFAULT_THEME.fg)
                    .add_modifier(Modifier::BOLD),
            ));
            spans.push(Span::styled(" = ", Style::default().fg(DEFAULT_THEME.comment)));
            spans.push(Span::styled(row.value.clone(), value_style(&row.value)));

            let mut item = ListItem::new(Line::from(spans));
            if row.owner == data.selected && row.depth == 0 {
                item = item.style(Style::default().bg(DEFAULT_THEME.current_line_bg));
            }
            item
        })
        .collect();

    frame.render_widget(List::new(items).block(block), area);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leaf(name: &str, value: &str) -> ValueNode {
        ValueNode {
            name: name.to_string(),
            type_name: "int".to_string(),
            value: Some(value.to_string()),
            ..Default::default()
        }
    }

    fn two_pairs() -> ValueNode {
        let pair = |name: &str, k: &str| ValueNode {
            name: name.to_string(),
            type_name: "std::pair<const int, int>".to_string(),
            children: vec![leaf("first", k), leaf("second", k)],
            might_have_children: true,
            ..Default::default()
        };
        ValueNode {
            name: "ii".to_string(),
            type_name: "intint_map".to_string(),
            summary: Some("size=3".to_string()),
            children: vec![pair("[0]", "0"), pair("[1]", "1")],
            elided: 1,
            container: true,
            might_have_children: true,
            ..Default::default()
        }
    }

    #[test]
    fn test_collapsed_variable_is_one_row() {
        let rows = variable_rows(2, &two_pairs(), false);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].expander, Expander::Collapsed);
        assert_eq!(rows[0].value, "size=3 {...}");
        assert_eq!(rows[0].owner, 2);
    }

    #[test]
    fn test_expanded_variable_lists_children() {
        let rows = variable_rows(0, &two_pairs(), true);
        let lines: Vec<_> = rows.iter().map(|r| (r.name.as_str(), r.value.as_str())).collect();
        assert_eq!(
            lines,
            vec![
                ("ii", "size=3"),
                ("[0]", "(first = 0, second = 0)"),
                ("[1]", "(first = 1, second = 1)"),
                ("...", "1 more"),
            ]
        );
        assert!(rows[1..].iter().all(|r| r.depth == 1 && r.type_name.is_none()));
    }

    #[test]
    fn test_scalars_are_leaves() {
        let rows = variable_rows(0, &leaf("x", "7"), true);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].expander, Expander::Leaf);
        assert_eq!(value_style("7").fg, Some(DEFAULT_THEME.number));
        assert_eq!(value_style("\"hi\"").fg, Some(DEFAULT_THEME.string));
        assert_eq!(value_style("<paged out>").fg, Some(DEFAULT_THEME.error));
    }
}
