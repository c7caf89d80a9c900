//! `frame variable` style text

use super::ValueNode;

/// `(type) name = value`, with expanded children on indented lines
pub fn format_variable(node: &ValueNode) -> String {
    format!("({}) {} = {}", node.type_name, node.name, body(node, 0))
}

/// A single-line rendering of `node`'s value, collapsing nested children
pub fn format_inline(node: &ValueNode) -> String {
    if node.children.is_empty() || is_inline(node) {
        body(node, 0)
    } else {
        with_head(node.headline().unwrap_or_default(), "{...}")
    }
}

fn body(node: &ValueNode, indent: usize) -> String {
    let head = node.headline().unwrap_or_default();

    if node.children.is_empty() {
        if let Some(err) = &node.error {
            if node.value.is_none() && !node.container {
                return format!("<{}>", err);
            }
        }
        if node.container {
            return with_head(head, "{}");
        }
        if !head.is_empty() {
            return head.to_string();
        }
        return if node.might_have_children { "{...}" } else { "{}" }.to_string();
    }

    if is_inline(node) {
        let members: Vec<String> = node
            .children
            .iter()
            .map(|child| format!("{} = {}", child.name, body(child, indent)))
            .collect();
        return with_head(head, &format!("({})", members.join(", ")));
    }

    let pad = "  ".repeat(indent + 1);
    let mut out = with_head(head, "{\n");
    for child in &node.children {
        out.push_str(&format!("{}{} = {}\n", pad, child.name, body(child, indent + 1)));
    }
    if node.elided > 0 {
        out.push_str(&format!("{}...\n", pad));
    }
    if let Some(err) = &node.error {
        out.push_str(&format!("{}<{}>\n", pad, err));
    }
    out.push_str(&"  ".repeat(indent));
    out.push('}');
    out
}

/// Small aggregates of leaves print on one line, like a pair
fn is_inline(node: &ValueNode) -> bool {
    !node.container
        && node.elided == 0
        && node.error.is_none()
        && node
            .children
            .iter()
            .all(|c| c.children.is_empty() && !c.container && !c.might_have_children)
}

fn with_head(head: &str, rest: &str) -> String {
    if head.is_empty() {
        rest.to_string()
    } else {
        format!("{} {}", head, rest)
    }
}
