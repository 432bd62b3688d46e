use std::env;
use std::path::PathBuf;
use std::time::Instant;

use crossterm::event::{KeyCode, KeyEvent, KeyModifiers, MouseButton, MouseEvent, MouseEventKind};
use ratatui::layout::Rect;
use ratatui::widgets::ListState;
use snipfill::formula::format_number;
use snipfill::renderer::resolve_references;
use snipfill::{FieldDeclaration, FieldKind, FieldValue, ScanResult, ValueBindings};
use tracing::{debug, warn};

use crate::library::{Snippet, TreeItem, build_tree};
use crate::system::{load_library, run_editor_command, set_clipboard};

const DOUBLE_CLICK_MS: u128 = 400;

#[derive(Clone, Debug)]
pub(crate) enum View {
    List,
    Runner,
    Error,
}

#[derive(Clone, Debug)]
pub(crate) struct StatusMessage {
    pub(crate) text: String,
    pub(crate) since: Instant,
}

impl StatusMessage {
    fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            since: Instant::now(),
        }
    }
}

/// Fill-in form for one snippet, with the values that drive its preview.
#[derive(Clone, Debug)]
pub(crate) struct RunnerState {
    pub(crate) snippet_index: usize,
    pub(crate) body: String,
    pub(crate) scan: ScanResult,
    pub(crate) fields: Vec<FieldDeclaration>,
    pub(crate) values: ValueBindings,
    pub(crate) active_field: usize,
    pub(crate) field_scroll: usize,
    pub(crate) status: Option<StatusMessage>,
}

#[derive(Clone, Debug)]
pub(crate) struct App {
    pub(crate) library_path: PathBuf,
    pub(crate) snippets: Vec<Snippet>,
    pub(crate) tree_items: Vec<TreeItem>,
    pub(crate) list_state: ListState,
    pub(crate) list_scroll: usize,
    pub(crate) view: View,
    pub(crate) runner: Option<RunnerState>,
    pub(crate) error_message: Option<String>,
    pub(crate) last_click: Option<(usize, Instant)>,
    pub(crate) tree_area: Rect,
    pub(crate) should_quit: bool,
    pub(crate) list_status: Option<StatusMessage>,
    pub(crate) needs_redraw: bool,
}

impl App {
    pub(crate) fn load(library_path: PathBuf) -> Self {
        let mut app = Self {
            library_path,
            snippets: Vec::new(),
            tree_items: Vec::new(),
            list_state: ListState::default(),
            list_scroll: 0,
            view: View::List,
            runner: None,
            error_message: None,
            last_click: None,
            tree_area: Rect::default(),
            should_quit: false,
            list_status: None,
            needs_redraw: false,
        };
        if let Err(message) = app.reload() {
            app.view = View::Error;
            app.error_message = Some(message);
        }
        app
    }

    fn reload(&mut self) -> Result<(), String> {
        let snippets = load_library(&self.library_path).map_err(|err| {
            warn!(error = %err, "failed to load snippet library");
            err.to_string()
        })?;
        self.tree_items = build_tree(&snippets);
        self.snippets = snippets;
        self.list_state = ListState::default();
        if !self.tree_items.is_empty() {
            self.list_state.select(Some(0));
        }
        self.list_scroll = 0;
        Ok(())
    }

    pub(crate) fn on_key(&mut self, key: KeyEvent) {
        match self.view {
            View::List => self.on_key_list(key),
            View::Runner => self.on_key_runner(key),
            View::Error => self.on_key_error(key),
        }
    }

    pub(crate) fn on_mouse(&mut self, mouse: MouseEvent) {
        if let View::List = self.view {
            self.on_mouse_list(mouse);
        }
    }

    fn on_key_error(&mut self, key: KeyEvent) {
        if let KeyCode::Char('q') | KeyCode::Esc = key.code {
            self.should_quit = true;
        }
    }

    fn on_key_list(&mut self, key: KeyEvent) {
        match key.code {
            KeyCode::Char('q') | KeyCode::Esc => self.should_quit = true,
            KeyCode::Down | KeyCode::Char('j') => self.move_list(1),
            KeyCode::Up | KeyCode::Char('k') => self.move_list(-1),
            KeyCode::Enter => self.open_selected_snippet(),
            KeyCode::Char('e') => self.open_library_in_editor(),
            _ => {}
        }
    }

    fn on_mouse_list(&mut self, mouse: MouseEvent) {
        if mouse.kind != MouseEventKind::Down(MouseButton::Left) {
            return;
        }
        let Some(index) = self.index_from_mouse(mouse) else {
            return;
        };
        self.list_state.select(Some(index));
        if let Some((last_index, last_time)) = self.last_click {
            if last_index == index && last_time.elapsed().as_millis() <= DOUBLE_CLICK_MS {
                self.open_selected_snippet();
            }
        }
        self.last_click = Some((index, Instant::now()));
    }

    fn on_key_runner(&mut self, key: KeyEvent) {
        let Some(runner) = self.runner.as_mut() else {
            return;
        };
        let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);

        match key.code {
            KeyCode::Esc => self.view = View::List,
            KeyCode::Char('c') if ctrl => runner.copy_output(),
            KeyCode::Char('r') if ctrl => runner.reset_values(),
            KeyCode::Tab | KeyCode::Down => runner.next_field(),
            KeyCode::BackTab | KeyCode::Up => runner.prev_field(),
            KeyCode::Left => runner.cycle_option(-1),
            KeyCode::Right => runner.cycle_option(1),
            KeyCode::Backspace => runner.backspace(),
            KeyCode::Enter => runner.enter(),
            KeyCode::Char(ch) => runner.push_char(ch),
            _ => {}
        }
    }

    fn move_list(&mut self, delta: isize) {
        let len = self.tree_items.len();
        if len == 0 {
            return;
        }
        let current = self.list_state.selected().unwrap_or(0) as isize;
        let next = (current + delta).clamp(0, (len - 1) as isize) as usize;
        self.list_state.select(Some(next));
    }

    fn open_selected_snippet(&mut self) {
        let Some(snippet_index) = self
            .list_state
            .selected()
            .and_then(|index| self.tree_items.get(index))
            .and_then(|item| item.snippet_index)
        else {
            return;
        };
        let Some(snippet) = self.snippets.get(snippet_index) else {
            return;
        };
        debug!(name = %snippet.name, "opening snippet");
        self.runner = Some(RunnerState::new(snippet_index, &snippet.body));
        self.view = View::Runner;
    }

    fn open_library_in_editor(&mut self) {
        let editor = match env::var("EDITOR") {
            Ok(value) if !value.trim().is_empty() => value,
            _ => {
                self.list_status = Some(StatusMessage::new("EDITOR is not set"));
                return;
            }
        };

        if let Err(err) = run_editor_command(&editor, &self.library_path) {
            warn!(error = %err, "editor command failed");
            self.list_status = Some(StatusMessage::new(err.to_string()));
            return;
        }
        self.needs_redraw = true;

        if let Err(message) = self.reload() {
            self.list_status = Some(StatusMessage::new(message));
        }
    }

    fn index_from_mouse(&self, mouse: MouseEvent) -> Option<usize> {
        let area = self.tree_area;
        if area.width == 0 || area.height == 0 {
            return None;
        }
        if mouse.column < area.x
            || mouse.column >= area.x + area.width
            || mouse.row < area.y
            || mouse.row >= area.y + area.height
        {
            return None;
        }
        let index = self.list_scroll + (mouse.row - area.y) as usize;
        (index < self.tree_items.len()).then_some(index)
    }
}

impl RunnerState {
    pub(crate) fn new(snippet_index: usize, body: &str) -> Self {
        let scan = snipfill::scan(body);
        let fields = scan
            .unique_fields()
            .into_iter()
            .map(|field| FieldDeclaration {
                required: scan.is_required(&field.name),
                ..field.clone()
            })
            .collect();
        let values = scan.initial_bindings();
        Self {
            snippet_index,
            body: body.to_string(),
            scan,
            fields,
            values,
            active_field: 0,
            field_scroll: 0,
            status: None,
        }
    }

    pub(crate) fn output(&self) -> String {
        snipfill::render(&self.body, &self.values)
    }

    /// Each formula of the preview with its current value or error. Formulas
    /// are read after fields and `{name}` references resolve, as the preview
    /// evaluates them.
    pub(crate) fn formula_results(&self) -> Vec<(String, String)> {
        let resolved = resolve_references(&self.body, &self.values);
        snipfill::scan(&resolved)
            .formulas
            .into_iter()
            .map(|formula| {
                let result = match snipfill::evaluate(&formula.expression, &self.values) {
                    Ok(value) => format_number(value),
                    Err(err) => format!("error: {err}"),
                };
                (formula.expression, result)
            })
            .collect()
    }

    pub(crate) fn value_of(&self, field: &FieldDeclaration) -> Option<&FieldValue> {
        self.values.get(&field.name)
    }

    fn active(&self) -> Option<&FieldDeclaration> {
        self.fields.get(self.active_field)
    }

    fn next_field(&mut self) {
        if self.fields.is_empty() {
            return;
        }
        self.active_field = (self.active_field + 1) % self.fields.len();
    }

    fn prev_field(&mut self) {
        if self.fields.is_empty() {
            return;
        }
        self.active_field = self
            .active_field
            .checked_sub(1)
            .unwrap_or(self.fields.len() - 1);
    }

    fn active_text_mut(&mut self) -> Option<&mut String> {
        let field = self.fields.get(self.active_field)?;
        if !matches!(
            field.kind,
            FieldKind::SingleLineText | FieldKind::MultiLineText
        ) {
            return None;
        }
        let value = self.values.entry(field.name.clone()).or_default();
        if let FieldValue::Flag(_) = value {
            *value = FieldValue::default();
        }
        match value {
            FieldValue::Text(text) => Some(text),
            FieldValue::Flag(_) => None,
        }
    }

    fn push_char(&mut self, ch: char) {
        match self.active().map(|field| field.kind) {
            Some(FieldKind::Toggle) if ch == ' ' => self.toggle_active(),
            _ => {
                if let Some(text) = self.active_text_mut() {
                    text.push(ch);
                }
            }
        }
    }

    fn backspace(&mut self) {
        if let Some(text) = self.active_text_mut() {
            text.pop();
        }
    }

    fn enter(&mut self) {
        match self.active().map(|field| field.kind) {
            Some(FieldKind::MultiLineText) => {
                if let Some(text) = self.active_text_mut() {
                    text.push('\n');
                }
            }
            Some(FieldKind::Toggle) => self.toggle_active(),
            Some(FieldKind::Dropdown) => self.cycle_option(1),
            _ => self.next_field(),
        }
    }

    fn toggle_active(&mut self) {
        let Some(field) = self.active() else {
            return;
        };
        let name = field.name.clone();
        let on = self.values.get(&name).is_some_and(FieldValue::is_truthy);
        self.values.insert(name, FieldValue::Flag(!on));
    }

    fn cycle_option(&mut self, delta: isize) {
        let Some(field) = self.active() else {
            return;
        };
        if field.kind != FieldKind::Dropdown || field.options.is_empty() {
            return;
        }
        let len = field.options.len() as isize;
        let current = self
            .values
            .get(&field.name)
            .and_then(|value| field.options.iter().position(|option| option == value.field_text()));
        let next = match current {
            Some(position) => (position as isize + delta).rem_euclid(len) as usize,
            None if delta < 0 => field.options.len() - 1,
            None => 0,
        };
        let name = field.name.clone();
        let choice = FieldValue::Text(field.options[next].clone());
        self.values.insert(name, choice);
    }

    fn reset_values(&mut self) {
        self.values = self.scan.initial_bindings();
        self.status = Some(StatusMessage::new("Values reset"));
    }

    fn copy_output(&mut self) {
        let output = self.output();
        let missing: Vec<&str> = self
            .scan
            .missing_required(&self.values)
            .into_iter()
            .map(FieldDeclaration::display_label)
            .collect();
        let text = match set_clipboard(&output) {
            Ok(()) if missing.is_empty() => "Copied".to_string(),
            Ok(()) => format!("Copied, but required fields are empty: {}", missing.join(", ")),
            Err(err) => {
                warn!(error = %err, "copy failed");
                err.to_string()
            }
        };
        self.status = Some(StatusMessage::new(text));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BODY: &str = "{formtext: name=who; required=yes}{formparagraph: name=notes}\
                        {formtoggle: name=gift}{formdropdown: name=size; options=S, M, L}\
                        {formtext: name=who}";

    #[test]
    fn form_collapses_duplicate_names() {
        let runner = RunnerState::new(0, BODY);
        assert_eq!(runner.scan.fields.len(), 5);
        let names: Vec<&str> = runner.fields.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["who", "notes", "gift", "size"]);
    }

    #[test]
    fn typing_updates_preview_for_every_occurrence() {
        let mut runner = RunnerState::new(0, BODY);
        for ch in "Ana".chars() {
            runner.push_char(ch);
        }
        runner.backspace();
        assert_eq!(runner.values["who"], FieldValue::from("An"));
        assert_eq!(runner.output(), "AnAn");
    }

    #[test]
    fn paragraph_accepts_newlines() {
        let mut runner = RunnerState::new(0, BODY);
        runner.next_field();
        runner.push_char('a');
        runner.enter();
        runner.push_char('b');
        assert_eq!(runner.values["notes"], FieldValue::from("a\nb"));
    }

    #[test]
    fn toggle_flips_with_space_and_enter() {
        let mut runner = RunnerState::new(0, BODY);
        runner.active_field = 2;
        runner.push_char(' ');
        assert_eq!(runner.values["gift"], FieldValue::Flag(true));
        assert!(runner.output().contains("Yes"));
        runner.enter();
        assert_eq!(runner.values["gift"], FieldValue::Flag(false));
    }

    #[test]
    fn dropdown_cycles_through_options() {
        let mut runner = RunnerState::new(0, BODY);
        runner.active_field = 3;
        runner.cycle_option(1);
        assert_eq!(runner.values["size"], FieldValue::from("S"));
        runner.cycle_option(-1);
        assert_eq!(runner.values["size"], FieldValue::from("L"));
        runner.cycle_option(1);
        assert_eq!(runner.values["size"], FieldValue::from("S"));
        runner.push_char('x');
        assert_eq!(runner.values["size"], FieldValue::from("S"));
    }

    #[test]
    fn field_navigation_wraps() {
        let mut runner = RunnerState::new(0, BODY);
        runner.prev_field();
        assert_eq!(runner.active_field, 3);
        runner.next_field();
        assert_eq!(runner.active_field, 0);
    }

    #[test]
    fn formula_panel_reports_results_and_errors() {
        let mut runner = RunnerState::new(0, "{formtext: name=qty; default=2}{= qty * 3}{= qty /}");
        let results = runner.formula_results();
        assert_eq!(results[0], ("qty * 3".to_string(), "6".to_string()));
        assert!(results[1].1.starts_with("error:"));
        runner.push_char('0');
        assert_eq!(runner.formula_results()[0].1, "60");
    }

    #[test]
    fn formula_panel_matches_preview_for_references() {
        let runner = RunnerState::new(0, "{formtext: name=qty; default=4}{= {qty} * 2}");
        assert_eq!(runner.output(), "48");
        assert_eq!(
            runner.formula_results(),
            vec![("4 * 2".to_string(), "8".to_string())]
        );
    }

    #[test]
    fn later_required_declaration_marks_form_field() {
        let runner = RunnerState::new(0, "{formtext: name=x}{formtext: name=x; required=yes}");
        assert_eq!(runner.fields.len(), 1);
        assert!(runner.fields[0].required);
        assert_eq!(runner.scan.missing_required(&runner.values).len(), 1);
    }

    #[test]
    fn reset_restores_defaults() {
        let mut runner = RunnerState::new(0, "{formtext: name=qty; default=2}");
        runner.push_char('5');
        runner.reset_values();
        assert_eq!(runner.values["qty"], FieldValue::from("2"));
    }
}
