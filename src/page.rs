use crate::model::{PageKind, PageRequest, Row, RowKey};

/// One navigable view of cluster data. Selection always indexes the
/// filtered rows and is `None` only when nothing is visible.
#[derive(Debug, Clone)]
pub struct Page {
    request: PageRequest,
    header: Vec<String>,
    rows: Vec<Row>,
    filter: String,
    selected: Option<usize>,
    loaded: bool,
}

impl Page {
    pub fn new(request: PageRequest) -> Self {
        Self {
            request,
            header: Vec::new(),
            rows: Vec::new(),
            filter: String::new(),
            selected: None,
            loaded: false,
        }
    }

    pub fn kind(&self) -> PageKind {
        self.request.kind()
    }

    pub fn request(&self) -> &PageRequest {
        &self.request
    }

    pub fn header(&self) -> &[String] {
        &self.header
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn filter(&self) -> &str {
        &self.filter
    }

    pub fn loaded(&self) -> bool {
        self.loaded
    }

    pub fn selected(&self) -> Option<usize> {
        self.selected
    }

    pub fn visible_rows(&self) -> Vec<&Row> {
        self.rows
            .iter()
            .filter(|row| row.matches_filter(&self.filter))
            .collect()
    }

    pub fn visible_len(&self) -> usize {
        self.rows
            .iter()
            .filter(|row| row.matches_filter(&self.filter))
            .count()
    }

    pub fn selected_row(&self) -> Option<&Row> {
        let selected = self.selected?;
        self.visible_rows().into_iter().nth(selected)
    }

    pub fn selected_key(&self) -> Option<&RowKey> {
        self.selected_row()
            .map(|row| &row.key)
            .filter(|key| !matches!(key, RowKey::None))
    }

    /// Replaces the row data, keeping the selection on the same key when it
    /// survives the refresh and otherwise on the same position.
    pub fn set_rows(&mut self, header: Vec<String>, rows: Vec<Row>) {
        let previous_key = self.selected_key().cloned();
        let previous_index = self.selected;

        self.header = header;
        self.rows = rows;
        self.loaded = true;

        let reselected = previous_key.and_then(|key| {
            self.visible_rows()
                .iter()
                .position(|row| row.key == key)
        });
        self.selected = reselected.or(previous_index).or(Some(0));
        self.clamp_selection();
    }

    pub fn append_rows(&mut self, rows: Vec<Row>, max_rows: usize) {
        self.rows.extend(rows);
        if self.rows.len() > max_rows {
            let overflow = self.rows.len() - max_rows;
            self.rows.drain(..overflow);
        }
        self.loaded = true;
        if self.selected.is_none() {
            self.selected = Some(0);
        }
        self.clamp_selection();
    }

    pub fn set_filter(&mut self, filter: impl Into<String>) {
        self.filter = filter.into();
        if self.selected.is_none() {
            self.selected = Some(0);
        }
        self.clamp_selection();
    }

    pub fn move_selection(&mut self, delta: isize) {
        let visible_len = self.visible_len();
        if visible_len == 0 {
            self.selected = None;
            return;
        }

        let max_index = visible_len.saturating_sub(1) as isize;
        let current = self.selected.unwrap_or(0).min(max_index as usize) as isize;
        self.selected = Some((current + delta).clamp(0, max_index) as usize);
    }

    pub fn select_first(&mut self) {
        self.selected = (self.visible_len() > 0).then_some(0);
    }

    pub fn select_last(&mut self) {
        self.selected = self.visible_len().checked_sub(1);
    }

    fn clamp_selection(&mut self) {
        let visible_len = self.visible_len();
        self.selected = match (self.selected, visible_len) {
            (_, 0) => None,
            (Some(selected), len) => Some(selected.min(len - 1)),
            (None, _) => None,
        };
    }
}
