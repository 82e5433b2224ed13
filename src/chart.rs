use std::io::{Write, stdout};

use anyhow::Result;
use crossterm::cursor::{Hide, MoveTo, Show};
use crossterm::execute;
use crossterm::style::{Color, Stylize};
use crossterm::terminal::{self, Clear, ClearType, EnterAlternateScreen, LeaveAlternateScreen};

use crate::aggregate::DayMatrix;
use crate::config::ChartUnit;
use crate::util::{format_amount, truncate};

const FOOTER: &str = "Press q or Ctrl+C to quit.";
const DAY_LABEL_FORMAT: &str = "%m-%d";
const MIN_PLOT_ROWS: usize = 3;
const MARKERS: [char; 8] = ['*', 'o', '+', 'x', '#', '@', '%', '&'];
const SERIES_COLORS: [Color; 8] = [
    Color::Cyan,
    Color::Yellow,
    Color::Magenta,
    Color::Green,
    Color::Red,
    Color::Blue,
    Color::White,
    Color::DarkYellow,
];

pub struct ChartData<'a> {
    pub matrix: &'a DayMatrix,
    pub labels: &'a [String],
    pub unit: ChartUnit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Glyph {
    ch: char,
    series: Option<usize>,
}

impl Glyph {
    const BLANK: Glyph = Glyph {
        ch: ' ',
        series: None,
    };

    fn plain(ch: char) -> Self {
        Self { ch, series: None }
    }
}

#[derive(Debug, Clone)]
pub struct ChartFrame {
    rows: Vec<Vec<Glyph>>,
}

impl ChartFrame {
    pub fn height(&self) -> usize {
        self.rows.len()
    }

    pub fn to_plain(&self) -> String {
        self.rows
            .iter()
            .map(|row| {
                let line: String = row.iter().map(|glyph| glyph.ch).collect();
                line.trim_end().to_string()
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn write_colored(&self, out: &mut impl Write, max_rows: u16) -> Result<()> {
        for (index, row) in self.rows.iter().enumerate() {
            let Ok(row_index) = u16::try_from(index) else {
                break;
            };
            if row_index >= max_rows {
                break;
            }
            execute!(out, MoveTo(0, row_index), Clear(ClearType::CurrentLine))?;
            for glyph in row {
                match glyph.series {
                    Some(series) => write!(out, "{}", glyph.ch.with(series_color(series)))?,
                    None => write!(out, "{}", glyph.ch)?,
                }
            }
        }
        Ok(())
    }
}

struct Canvas {
    rows: Vec<Vec<Glyph>>,
}

impl Canvas {
    fn new(width: usize, height: usize) -> Self {
        Self {
            rows: vec![vec![Glyph::BLANK; width]; height],
        }
    }

    fn put(&mut self, row: usize, col: usize, glyph: Glyph) {
        if let Some(cell) = self.rows.get_mut(row).and_then(|cells| cells.get_mut(col)) {
            *cell = glyph;
        }
    }

    fn put_text(&mut self, row: usize, col: usize, text: &str, series: Option<usize>) {
        for (offset, ch) in text.chars().enumerate() {
            self.put(row, col + offset, Glyph { ch, series });
        }
    }
}

/// Lays the matrix out as one polyline per row over a `width` x `height` grid.
pub fn layout(data: &ChartData<'_>, width: u16, height: u16) -> ChartFrame {
    let width = width as usize;
    let height = height as usize;
    let matrix = data.matrix;
    let series_count = matrix.minutes.len();
    let day_count = matrix.day_count();

    let legend_rows = series_count.min(height.saturating_sub(4 + MIN_PLOT_ROWS).max(1));
    let plot_rows = height.saturating_sub(4 + legend_rows).max(MIN_PLOT_ROWS);

    let max_value = data.unit.scale(matrix.max_value());
    let scale_top = if max_value > 0.0 { max_value } else { 1.0 };
    let top_label = format_amount(scale_top, data.unit);
    let mid_label = format_amount(scale_top / 2.0, data.unit);
    let zero_label = format_amount(0.0, data.unit);
    let label_width = top_label.len().max(mid_label.len()).max(zero_label.len());
    let axis_col = label_width;
    let plot_left = axis_col + 1;
    let plot_width = width.saturating_sub(plot_left).max(1);

    let total_rows = 1 + plot_rows + 2 + legend_rows;
    let mut canvas = Canvas::new(width.max(plot_left + 1), total_rows);

    let title = format!(
        "Steam playtime per day ({}) {} .. {}",
        data.unit.title(),
        matrix.first_day,
        matrix.last_day()
    );
    canvas.put_text(0, 0, &truncate(&title, width), None);

    let plot_top = 1;
    let value_row = |value: f64| -> usize {
        let ratio = (data.unit.scale(value) / scale_top).clamp(0.0, 1.0);
        let from_bottom = (ratio * (plot_rows - 1) as f64).round() as usize;
        plot_top + plot_rows - 1 - from_bottom
    };
    let day_col = |day: usize| -> usize {
        if day_count <= 1 {
            plot_left + plot_width / 2
        } else {
            plot_left + day * (plot_width - 1) / (day_count - 1)
        }
    };

    for row in plot_top..plot_top + plot_rows {
        canvas.put(row, axis_col, Glyph::plain('|'));
    }
    canvas.put_text(plot_top, 0, &format!("{top_label:>label_width$}"), None);
    if plot_rows >= 5 {
        let mid_row = plot_top + (plot_rows - 1) / 2;
        canvas.put_text(mid_row, 0, &format!("{mid_label:>label_width$}"), None);
    }
    let baseline = plot_top + plot_rows - 1;
    canvas.put_text(baseline, 0, &format!("{zero_label:>label_width$}"), None);

    for (series, row_values) in matrix.minutes.iter().enumerate() {
        let points: Vec<(usize, usize)> = row_values
            .iter()
            .enumerate()
            .map(|(day, value)| (day_col(day), value_row(*value)))
            .collect();
        for pair in points.windows(2) {
            draw_segment(&mut canvas, pair[0], pair[1], series);
        }
        let marker = series_marker(series);
        for (col, row) in points {
            canvas.put(
                row,
                col,
                Glyph {
                    ch: marker,
                    series: Some(series),
                },
            );
        }
    }

    let axis_row = plot_top + plot_rows;
    canvas.put(axis_row, axis_col, Glyph::plain('+'));
    for col in plot_left..plot_left + plot_width {
        canvas.put(axis_row, col, Glyph::plain('-'));
    }

    let label_row = axis_row + 1;
    let mut next_free = 0usize;
    for (index, day) in matrix.days().iter().enumerate() {
        let label = day.format(DAY_LABEL_FORMAT).to_string();
        let col = day_col(index);
        let start = col
            .saturating_sub(label.len() / 2)
            .min(width.saturating_sub(label.len()))
            .max(next_free);
        if start + label.len() > width {
            break;
        }
        if start > col {
            continue;
        }
        canvas.put_text(label_row, start, &label, None);
        next_free = start + label.len() + 1;
    }

    let legend_top = label_row + 1;
    for series in 0..legend_rows {
        let is_overflow_row = series + 1 == legend_rows && series_count > legend_rows;
        let text = if is_overflow_row {
            format!("  ... {} more", series_count - series)
        } else {
            let label = data.labels.get(series).map(String::as_str).unwrap_or("?");
            let total = format_amount(data.unit.scale(matrix.row_total(series)), data.unit);
            format!("{} {} ({})", series_marker(series), label, total)
        };
        let color = (!is_overflow_row).then_some(series);
        canvas.put_text(legend_top + series, 0, &truncate(&text, width), color);
    }

    ChartFrame { rows: canvas.rows }
}

fn draw_segment(canvas: &mut Canvas, from: (usize, usize), to: (usize, usize), series: usize) {
    let (mut x, mut y) = (from.0 as i64, from.1 as i64);
    let (x1, y1) = (to.0 as i64, to.1 as i64);
    let dx = (x1 - x).abs();
    let dy = -(y1 - y).abs();
    let sx = if x < x1 { 1 } else { -1 };
    let sy = if y < y1 { 1 } else { -1 };
    let mut err = dx + dy;
    loop {
        canvas.put(
            y as usize,
            x as usize,
            Glyph {
                ch: '.',
                series: Some(series),
            },
        );
        if x == x1 && y == y1 {
            break;
        }
        let doubled = 2 * err;
        if doubled >= dy {
            err += dy;
            x += sx;
        }
        if doubled <= dx {
            err += dx;
            y += sy;
        }
    }
}

fn series_marker(series: usize) -> char {
    MARKERS[series % MARKERS.len()]
}

fn series_color(series: usize) -> Color {
    SERIES_COLORS[series % SERIES_COLORS.len()]
}

pub fn enter_terminal() -> Result<()> {
    let mut out = stdout();
    terminal::enable_raw_mode()?;
    execute!(out, EnterAlternateScreen, Hide)?;
    Ok(())
}

pub fn leave_terminal() -> Result<()> {
    let mut out = stdout();
    execute!(out, Show, LeaveAlternateScreen)?;
    terminal::disable_raw_mode()?;
    Ok(())
}

pub fn draw(data: &ChartData<'_>) -> Result<()> {
    let mut out = stdout();
    let (width, height) = terminal::size()?;
    if width == 0 || height == 0 {
        return Ok(());
    }

    execute!(out, MoveTo(0, 0), Clear(ClearType::All))?;
    let body_rows = height.saturating_sub(1);
    let frame = layout(data, width, body_rows);
    frame.write_colored(&mut out, body_rows)?;

    execute!(out, MoveTo(0, height - 1), Clear(ClearType::CurrentLine))?;
    write!(out, "{}", truncate(FOOTER, width as usize).dark_grey())?;
    out.flush()?;
    Ok(())
}
