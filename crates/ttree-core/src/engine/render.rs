use super::binding::BindingTable;
use super::config::{MassComments, RenderMode};
use super::error::BindingError;
use crate::core::models::template::{Template, TemplateItem, TextBlock};

fn is_deleted(item: &TemplateItem, table: &BindingTable) -> bool {
    item.as_var()
        .and_then(|v| v.binding)
        .and_then(|id| table.get(id))
        .is_some_and(|b| b.deleted)
}

/// Removes every line of `template` that references a deleted binding.
///
/// A line runs from just after the previous newline through the next one. The
/// other references on a removed line are released, so a binding used nowhere
/// else drops out of counting and the report. Removal never spreads past the
/// lines that mention a deleted binding.
pub(crate) fn delete_lines_with_deleted_vars(template: &mut Template, table: &mut BindingTable) {
    while let Some(hit) = template.iter().position(|item| is_deleted(item, table)) {
        let start = template[..hit].iter().enumerate().rev().find_map(|(i, item)| {
            match item {
                TemplateItem::Text(t) => t.text.rfind('\n').map(|off| (i, off + 1)),
                TemplateItem::Var(_) => None,
            }
        });
        let end = template[hit + 1..]
            .iter()
            .enumerate()
            .find_map(|(i, item)| match item {
                TemplateItem::Text(t) => t.text.find('\n').map(|off| (hit + 1 + i, off + 1)),
                TemplateItem::Var(_) => None,
            });

        let first_dropped = start.map_or(0, |(i, _)| i + 1);
        let last_dropped = end.map_or(template.len(), |(i, _)| i);
        for item in &template[first_dropped..last_dropped] {
            if let Some(id) = item.as_var().and_then(|v| v.binding) {
                if table.get(id).is_some_and(|b| !b.deleted) {
                    table.release(id);
                }
            }
        }

        let items = std::mem::take(template);
        let mut kept = Vec::with_capacity(items.len());
        for (i, item) in items.into_iter().enumerate() {
            match (start, end) {
                (Some((si, off)), _) if i == si => {
                    if let TemplateItem::Text(t) = item {
                        push_text(&mut kept, t.text[..off].to_string(), t);
                    }
                }
                (_, Some((ei, off))) if i == ei => {
                    if let TemplateItem::Text(t) = item {
                        push_text(&mut kept, t.text[off..].to_string(), t);
                    }
                }
                _ if i >= first_dropped && i < last_dropped => {}
                _ => kept.push(item),
            }
        }
        *template = kept;
    }
}

fn push_text(items: &mut Template, text: String, block: TextBlock) {
    if !text.is_empty() {
        items.push(TemplateItem::Text(TextBlock {
            text,
            loc: block.loc,
        }));
    }
}

/// Concatenates the template, substituting each variable according to `mode`.
pub(crate) fn render(
    template: &Template,
    table: &BindingTable,
    mode: RenderMode,
) -> Result<String, BindingError> {
    let mut out = String::new();
    for item in template {
        match item {
            TemplateItem::Text(t) => out.push_str(&t.text),
            TemplateItem::Var(var) => {
                let unbound = || BindingError::Unbound {
                    loc: var.loc.clone(),
                    var: var.source_text(),
                };
                let binding = var
                    .binding
                    .and_then(|id| table.get(id))
                    .ok_or_else(unbound)?;
                match mode {
                    RenderMode::Values => {
                        let value = binding.value.as_deref().ok_or_else(unbound)?;
                        match var.modifier {
                            Some(m) => out.push_str(&m.apply(value)),
                            None => out.push_str(value),
                        }
                    }
                    RenderMode::Names if var.is_braced() => {
                        out.push_str(&var.prefix);
                        out.push_str(&binding.full_name[1..]);
                        out.push_str(&var.suffix);
                    }
                    RenderMode::Names => out.push_str(&binding.full_name),
                }
            }
        }
    }
    Ok(out)
}

/// Renders a `Data Masses` template, appending `# <type>` to each line that is
/// exactly a type reference followed by one value.
pub(crate) fn render_with_type_comments(
    template: &Template,
    table: &BindingTable,
    mode: RenderMode,
    style: MassComments,
) -> Result<String, BindingError> {
    if style == MassComments::Off {
        return render(template, table, mode);
    }
    let mut out = String::new();
    for line in split_lines(template) {
        let text = render(&line, table, mode)?;
        match type_comment(&line, table, style) {
            Some(name) => {
                let body = text.trim_end();
                out.push_str(body);
                out.push_str("  # ");
                out.push_str(&name);
                out.push_str(&text[body.len()..].replace([' ', '\t'], ""));
            }
            None => out.push_str(&text),
        }
    }
    Ok(out)
}

/// Splits `template` after every newline, cutting text blocks as needed.
fn split_lines(template: &Template) -> Vec<Template> {
    let mut lines = Vec::new();
    let mut current = Template::new();
    for item in template {
        match item {
            TemplateItem::Text(t) => {
                for piece in t.text.split_inclusive('\n') {
                    push_text(&mut current, piece.to_string(), t.clone());
                    if piece.ends_with('\n') {
                        lines.push(std::mem::take(&mut current));
                    }
                }
            }
            TemplateItem::Var(_) => current.push(item.clone()),
        }
    }
    if !current.is_empty() {
        lines.push(current);
    }
    lines
}

fn type_comment(line: &Template, table: &BindingTable, style: MassComments) -> Option<String> {
    let mut items = line
        .iter()
        .filter(|item| !matches!(item, TemplateItem::Text(t) if t.text.trim().is_empty()));
    let var = items.next()?.as_var()?;
    let TemplateItem::Text(rest) = items.next()? else {
        return None;
    };
    if items.next().is_some() || rest.text.split_whitespace().count() != 1 {
        return None;
    }
    let full_name = &table.get(var.binding?)?.full_name;
    let path = full_name.split_once(':').map_or(full_name.as_str(), |(_, p)| p);
    match style {
        MassComments::Full => Some(path.to_string()),
        _ => path.rsplit('/').next().map(str::to_string),
    }
}
