use ratatui::Frame;
use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span, Text};
use ratatui::widgets::{Block, List, ListItem, ListState, Paragraph, Wrap};
use snipfill::renderer::DEFAULT_TRUE_TEXT;
use snipfill::{FieldDeclaration, FieldKind, FieldValue};

use crate::app::{App, RunnerState, StatusMessage, View};
use crate::library::TreeItem;

const STATUS_DURATION_MS: u128 = 1500;
const ICON_FOLDER: &str = "▸";
const ICON_SNIPPET: &str = "•";
const SELECTED_MARKER: &str = "> ";
const UNSELECTED_MARKER: &str = "  ";
const TREE_BRANCH: &str = "├─ ";
const TREE_LAST: &str = "└─ ";
const TREE_PIPE: &str = "│  ";
const TREE_EMPTY: &str = "   ";
const LINE_FIELD_HEIGHT: u16 = 3;
const PARAGRAPH_FIELD_HEIGHT: u16 = 6;

pub(crate) fn render_app(frame: &mut Frame, app: &mut App) {
    match app.view {
        View::List => render_list(frame, app),
        View::Runner => render_runner(frame, app),
        View::Error => render_error(frame, app),
    }
}

fn render_error(frame: &mut Frame, app: &mut App) {
    let message = app
        .error_message
        .clone()
        .unwrap_or_else(|| "Unknown error".to_string());
    let paragraph = Paragraph::new(format!("{message}\n\nPress q to quit."))
        .block(Block::bordered().title("Error"))
        .style(Style::new().fg(Color::Red))
        .wrap(Wrap { trim: false });
    frame.render_widget(paragraph, frame.area());
}

fn render_list(frame: &mut Frame, app: &mut App) {
    let layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Fill(1), Constraint::Length(1)])
        .split(frame.area());
    let list_area = layout[0];
    let help_area = layout[1];

    let block = Block::bordered().title(format!("Snippets ({})", app.snippets.len()));
    let inner = inner_rect(list_area);
    app.tree_area = inner;

    let view_height = inner.height as usize;
    let selected = app.list_state.selected().unwrap_or(0);
    app.list_scroll = ensure_visible(app.list_scroll, selected, app.tree_items.len(), view_height);

    let start = app.list_scroll;
    let end = (start + view_height).min(app.tree_items.len());
    let tree_lines = build_tree_lines(&app.tree_items);

    let items: Vec<ListItem> = tree_lines[start..end]
        .iter()
        .enumerate()
        .map(|(offset, line)| {
            let marker = if start + offset == selected {
                SELECTED_MARKER
            } else {
                UNSELECTED_MARKER
            };
            ListItem::new(format!("{marker}{line}"))
        })
        .collect();

    let list = List::new(items)
        .block(block)
        .highlight_style(Style::new().bg(Color::Blue).fg(Color::White));

    let mut state = ListState::default();
    if (start..end).contains(&selected) {
        state.select(Some(selected - start));
    }
    frame.render_stateful_widget(list, list_area, &mut state);

    let help = with_status(
        "↑↓/j k select  Enter/double-click open  e edit library  q quit",
        app.list_status.as_ref(),
    );
    frame.render_widget(
        Paragraph::new(help).style(Style::new().fg(Color::DarkGray)),
        help_area,
    );
}

fn render_runner(frame: &mut Frame, app: &mut App) {
    let Some(runner) = app.runner.as_mut() else {
        return;
    };
    let title = app
        .snippets
        .get(runner.snippet_index)
        .map(|snippet| format!("Preview: {}", snippet.name))
        .unwrap_or_else(|| "Preview".to_string());

    let layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Fill(1), Constraint::Length(1)])
        .split(frame.area());
    let content_area = layout[0];
    let status_area = layout[1];

    let horizontal = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(35), Constraint::Percentage(65)])
        .split(content_area);
    let form_area = horizontal[0];

    let preview_area = {
        let formulas = runner.formula_results();
        if formulas.is_empty() {
            horizontal[1]
        } else {
            let formula_height =
                (formulas.len() as u16).saturating_add(2).min(horizontal[1].height / 3);
            let right = Layout::default()
                .direction(Direction::Vertical)
                .constraints([Constraint::Fill(1), Constraint::Length(formula_height)])
                .split(horizontal[1]);
            render_formulas(frame, &formulas, right[1]);
            right[0]
        }
    };

    let output = runner.output();
    render_fields(frame, runner, form_area);
    let preview = Paragraph::new(output)
        .block(Block::bordered().title(title))
        .wrap(Wrap { trim: false });
    frame.render_widget(preview, preview_area);

    let status = with_status(
        "Esc back  Tab/↑↓ field  Space toggle  ←→ choose  Ctrl+C copy  Ctrl+R reset",
        runner.status.as_ref(),
    );
    frame.render_widget(
        Paragraph::new(status).style(Style::new().fg(Color::DarkGray)),
        status_area,
    );
}

fn render_fields(frame: &mut Frame, runner: &mut RunnerState, area: Rect) {
    let inner = inner_rect(area);
    frame.render_widget(Block::bordered().title("Fields"), area);

    if runner.fields.is_empty() {
        let note = Paragraph::new("This snippet has no dynamic fields.")
            .style(Style::new().fg(Color::DarkGray))
            .wrap(Wrap { trim: false });
        frame.render_widget(note, inner);
        return;
    }

    let heights: Vec<u16> = runner.fields.iter().map(field_height).collect();
    runner.field_scroll =
        ensure_field_visible(runner.field_scroll, runner.active_field, &heights, inner.height);

    let bottom = inner.y + inner.height;
    let mut y = inner.y;
    for (index, field) in runner.fields.iter().enumerate().skip(runner.field_scroll) {
        if y >= bottom {
            break;
        }
        let height = heights[index].min(bottom - y);
        let is_active = index == runner.active_field;
        let border_style = if is_active {
            Style::new().fg(Color::Blue)
        } else {
            Style::new().fg(Color::DarkGray)
        };
        let mut title = field.display_label().to_string();
        if field.required {
            title.push_str(" *");
        }
        let field_area = Rect {
            x: inner.x,
            y,
            width: inner.width,
            height,
        };
        let paragraph = Paragraph::new(field_content(field, runner.value_of(field), is_active))
            .block(Block::bordered().title(title).border_style(border_style))
            .wrap(Wrap { trim: false });
        frame.render_widget(paragraph, field_area);
        y += height;
    }
}

fn field_height(field: &FieldDeclaration) -> u16 {
    match field.kind {
        FieldKind::MultiLineText => PARAGRAPH_FIELD_HEIGHT,
        _ => LINE_FIELD_HEIGHT,
    }
}

fn field_content(
    field: &FieldDeclaration,
    value: Option<&FieldValue>,
    is_active: bool,
) -> Text<'static> {
    let dim = Style::new().fg(Color::DarkGray);
    match field.kind {
        FieldKind::Toggle => {
            let on = value.is_some_and(FieldValue::is_truthy);
            let text = if on {
                field.true_text.as_deref().unwrap_or(DEFAULT_TRUE_TEXT)
            } else {
                field.false_text.as_deref().unwrap_or("")
            };
            Text::from(Line::from(vec![
                Span::raw(if on { "[x] on  " } else { "[ ] off " }),
                Span::styled(text.to_string(), dim),
            ]))
        }
        FieldKind::Dropdown => {
            let current = value.map(FieldValue::field_text).unwrap_or_default();
            let shown = if current.is_empty() { "(none)" } else { current };
            Text::from(Line::from(vec![
                Span::styled(format!("< {shown} >"), Style::new().add_modifier(Modifier::BOLD)),
                Span::styled(format!("  {}", field.options.join(" / ")), dim),
            ]))
        }
        FieldKind::SingleLineText | FieldKind::MultiLineText => {
            let mut text = value.map(FieldValue::field_text).unwrap_or_default().to_string();
            if is_active {
                text.push('|');
            }
            Text::raw(text)
        }
    }
}

fn render_formulas(frame: &mut Frame, formulas: &[(String, String)], area: Rect) {
    let lines: Vec<Line> = formulas
        .iter()
        .map(|(expression, result)| {
            let style = if result.starts_with("error") {
                Style::new().fg(Color::Red)
            } else {
                Style::new().fg(Color::Green)
            };
            Line::from(vec![
                Span::raw(format!("{expression} = ")),
                Span::styled(result.clone(), style),
            ])
        })
        .collect();
    let paragraph = Paragraph::new(lines).block(Block::bordered().title("Formulas"));
    frame.render_widget(paragraph, area);
}

fn with_status(help: &str, status: Option<&StatusMessage>) -> String {
    let mut line = help.to_string();
    if let Some(message) =
        status.filter(|msg| msg.since.elapsed().as_millis() <= STATUS_DURATION_MS)
    {
        line.push_str("  |  ");
        line.push_str(&message.text);
    }
    line
}

fn inner_rect(area: Rect) -> Rect {
    let mut inner = area;
    if inner.width >= 2 {
        inner.x += 1;
        inner.width -= 2;
    }
    if inner.height >= 2 {
        inner.y += 1;
        inner.height -= 2;
    }
    inner
}

fn ensure_visible(
    current_scroll: usize,
    selected: usize,
    total: usize,
    view_height: usize,
) -> usize {
    if total == 0 || view_height == 0 {
        return 0;
    }
    let mut scroll = current_scroll.min(total.saturating_sub(1));
    if selected < scroll {
        scroll = selected;
    } else if selected >= scroll + view_height {
        scroll = selected + 1 - view_height;
    }
    scroll
}

/// Scroll offset that keeps the active field fully inside `view_height`
/// rows, for fields of uneven height.
fn ensure_field_visible(
    current_scroll: usize,
    active: usize,
    heights: &[u16],
    view_height: u16,
) -> usize {
    if heights.is_empty() {
        return 0;
    }
    let active = active.min(heights.len() - 1);
    let mut scroll = current_scroll.min(active);
    while scroll < active && heights[scroll..=active].iter().sum::<u16>() > view_height {
        scroll += 1;
    }
    scroll
}

fn build_tree_lines(items: &[TreeItem]) -> Vec<String> {
    let mut lines = Vec::with_capacity(items.len());
    let mut branches: Vec<bool> = Vec::new();
    for (index, item) in items.iter().enumerate() {
        branches.truncate(item.depth);
        let is_last = is_last_sibling(items, index);
        let icon = if item.snippet_index.is_none() || has_children(items, index) {
            ICON_FOLDER
        } else {
            ICON_SNIPPET
        };

        let mut line = String::new();
        for has_next in &branches {
            line.push_str(if *has_next { TREE_PIPE } else { TREE_EMPTY });
        }
        line.push_str(if is_last { TREE_LAST } else { TREE_BRANCH });
        line.push_str(icon);
        line.push(' ');
        line.push_str(&item.label);
        lines.push(line);

        branches.push(!is_last);
    }
    lines
}

fn is_last_sibling(items: &[TreeItem], index: usize) -> bool {
    let depth = items[index].depth;
    items[index + 1..]
        .iter()
        .find(|item| item.depth <= depth)
        .is_none_or(|item| item.depth < depth)
}

fn has_children(items: &[TreeItem], index: usize) -> bool {
    items
        .get(index + 1)
        .is_some_and(|next| next.depth > items[index].depth)
}
