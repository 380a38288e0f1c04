use unicode_width::UnicodeWidthStr;

use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct TextMetrics {
    pub char_width: f64,
    pub padding_x: f64,
    pub header_height: f64,
    pub row_height: f64,
    pub row_spacing: f64,
    pub detailed_width: f64,
    pub simple_width: f64,
    pub simple_height: f64,
}

impl Default for TextMetrics {
    fn default() -> Self {
        Self {
            char_width: 8.0,
            padding_x: 16.0,
            header_height: 80.0,
            row_height: 28.0,
            row_spacing: 8.0,
            detailed_width: 480.0,
            simple_width: 200.0,
            simple_height: 80.0,
        }
    }
}

impl TextMetrics {
    pub fn text_width(&self, text: &str) -> f64 {
        let width = UnicodeWidthStr::width(text);
        width as f64 * self.char_width
    }

    /// Top of the first attribute row.
    pub fn rows_start_y(&self) -> f64 {
        self.header_height + self.row_spacing * 2.0
    }

    /// Vertical offset of row `index` inside a detailed node.
    pub fn row_y(&self, index: usize) -> f64 {
        self.rows_start_y() + index as f64 * (self.row_height + self.row_spacing)
    }

    /// Size of a detailed node: header plus one row per visible attribute.
    /// Rows are `(name, type)` pairs.
    pub fn detailed_size(&self, label: &str, rows: &[(String, String)]) -> (f64, f64) {
        let header_width = self.text_width(label) + self.padding_x * 2.0;
        let max_row_width = rows
            .iter()
            .map(|(name, typ)| {
                self.text_width(name) + self.text_width(typ) + self.char_width * 2.0
                    + self.padding_x * 2.0
            })
            .fold(0.0, f64::max);

        let width = header_width.max(max_row_width).max(self.detailed_width);
        let height = self.rows_start_y() + rows.len() as f64 * (self.row_height + self.row_spacing) + 2.0;

        (width, height)
    }

    /// Size of a simplified node: title only.
    pub fn simple_size(&self, label: &str) -> (f64, f64) {
        let width = (self.text_width(label) + self.padding_x * 2.0).max(self.simple_width);
        (width, self.simple_height)
    }
}
