//! ASCII plotting of fitted curves for terminal output.
//!
//! Fixed-size character grid, deterministic output. The domain value `v` runs along the x axis.
//!
//! Plot elements:
//! - fitted curve: `-` line
//! - reference values (ground truth, when known): `o`

/// Render a fitted curve sampled at `v = 0..fitted.len()`, optionally overlaid with reference
/// values at the same positions.
pub fn render_curve_plot(
    fitted: &[f64],
    reference: Option<&[f64]>,
    width: usize,
    height: usize,
) -> String {
    let width = width.max(10);
    let height = height.max(5);
    let v_max = fitted
        .len()
        .max(reference.map_or(0, <[f64]>::len))
        .saturating_sub(1)
        .max(1) as f64;

    let (y_min, y_max) = y_range(fitted, reference).unwrap_or((0.0, 1.0));
    let (y_min, y_max) = pad_range(y_min, y_max, 0.05);

    let mut grid = vec![vec![' '; width]; height];

    let curve: Vec<(f64, f64)> = fitted
        .iter()
        .enumerate()
        .filter(|(_, y)| y.is_finite())
        .map(|(v, &y)| (v as f64, y))
        .collect();
    draw_curve(&mut grid, &curve, v_max, y_min, y_max);

    for (v, &y) in reference.unwrap_or(&[]).iter().enumerate() {
        if !y.is_finite() {
            continue;
        }
        let x = map_x(v as f64, v_max, width);
        let row = map_y(y, y_min, y_max, height);
        grid[row][x] = 'o';
    }

    let mut out = String::new();
    out.push_str(&format!(
        "Plot: v=[0, {v_max:.0}] | y=[{y_min:.3}, {y_max:.3}]\n"
    ));
    for row in grid {
        out.push_str(&row.into_iter().collect::<String>());
        out.push('\n');
    }
    out
}

fn y_range(fitted: &[f64], reference: Option<&[f64]>) -> Option<(f64, f64)> {
    let mut min_y = f64::INFINITY;
    let mut max_y = f64::NEG_INFINITY;
    for &y in fitted.iter().chain(reference.unwrap_or(&[])) {
        if y.is_finite() {
            min_y = min_y.min(y);
            max_y = max_y.max(y);
        }
    }
    if min_y.is_finite() && max_y.is_finite() && max_y > min_y {
        Some((min_y, max_y))
    } else if min_y.is_finite() {
        Some((min_y - 0.5, min_y + 0.5))
    } else {
        None
    }
}

fn pad_range(min: f64, max: f64, frac: f64) -> (f64, f64) {
    let pad = ((max - min).abs() * frac).max(1e-12);
    (min - pad, max + pad)
}

fn map_x(v: f64, v_max: f64, width: usize) -> usize {
    let u = (v / v_max).clamp(0.0, 1.0);
    (u * (width as f64 - 1.0)).round() as usize
}

fn map_y(y: f64, y_min: f64, y_max: f64, height: usize) -> usize {
    let u = ((y - y_min) / (y_max - y_min)).clamp(0.0, 1.0);
    // Row 0 is the top.
    (height as f64 - 1.0 - (u * (height as f64 - 1.0))).round() as usize
}

fn draw_curve(grid: &mut [Vec<char>], curve: &[(f64, f64)], v_max: f64, y_min: f64, y_max: f64) {
    let height = grid.len();
    let width = grid.first().map_or(0, Vec::len);
    if width == 0 {
        return;
    }

    let mut prev = None;
    for &(v, y) in curve {
        let x = map_x(v, v_max, width);
        let row = map_y(y, y_min, y_max, height);
        match prev {
            Some((x0, y0)) => draw_line(grid, x0, y0, x, row, '-'),
            None => grid[row][x] = '-',
        }
        prev = Some((x, row));
    }
}

/// Bresenham line; only fills empty cells.
fn draw_line(grid: &mut [Vec<char>], x0: usize, y0: usize, x1: usize, y1: usize, ch: char) {
    let (mut x, mut y) = (x0 as isize, y0 as isize);
    let (x1, y1) = (x1 as isize, y1 as isize);

    let dx = (x1 - x).abs();
    let sx = if x < x1 { 1 } else { -1 };
    let dy = -(y1 - y).abs();
    let sy = if y < y1 { 1 } else { -1 };
    let mut err = dx + dy;

    loop {
        if let Some(cell) = grid
            .get_mut(y as usize)
            .and_then(|row| row.get_mut(x as usize))
        {
            if *cell == ' ' {
                *cell = ch;
            }
        }
        if x == x1 && y == y1 {
            break;
        }
        let e2 = 2 * err;
        if e2 >= dy {
            err += dy;
            x += sx;
        }
        if e2 <= dx {
            err += dx;
            y += sy;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plot_golden_snapshot_small() {
        let txt = render_curve_plot(&[1.0, 0.5, 0.0], None, 10, 5);
        let expected = concat!(
            "Plot: v=[0, 2] | y=[-0.050, 1.050]\n",
            "--        \n",
            "  --      \n",
            "    --    \n",
            "      --  \n",
            "        --\n",
        );
        assert_eq!(txt, expected);
    }

    #[test]
    fn reference_points_overlay_the_curve() {
        let txt = render_curve_plot(&[1.0, 0.5, 0.0], Some(&[1.0, 0.5, 0.0]), 10, 5);
        let rows: Vec<&str> = txt.lines().skip(1).collect();
        assert_eq!(rows[0].chars().next(), Some('o'));
        assert_eq!(rows[2].chars().nth(5), Some('o'));
        assert_eq!(rows[4].chars().nth(9), Some('o'));
    }

    #[test]
    fn flat_and_empty_curves_render() {
        let flat = render_curve_plot(&[0.25; 4], None, 12, 6);
        assert_eq!(flat.lines().count(), 7);
        let empty = render_curve_plot(&[], None, 12, 6);
        assert!(empty.starts_with("Plot: v=[0, 1]"));
    }
}
