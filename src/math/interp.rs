//! Linear interpolation with linear extrapolation beyond the table.
//!
//! Both the 1-D and the regular-grid variants extrapolate from the outermost
//! cell instead of clamping or failing, which keeps the forward model defined
//! for proposals slightly outside the tabulated range.

use crate::error::AppError;

/// Index `i` of the cell `[x[i], x[i+1]]` used for `v`, clamped to the outer
/// cells so values outside the axis extrapolate from the edge cell.
///
/// `x` must be strictly increasing with at least 2 points.
fn cell_index(x: &[f64], v: f64) -> usize {
    let n = x.len();
    // partition_point returns the first index with x[idx] > v.
    let idx = x.partition_point(|&xi| xi <= v);
    idx.saturating_sub(1).min(n - 2)
}

fn check_axis(x: &[f64], what: &str) -> Result<(), AppError> {
    if x.len() < 2 {
        return Err(AppError::data(format!("{what}: need at least 2 points.")));
    }
    if !x.windows(2).all(|w| w[1] > w[0]) {
        return Err(AppError::data(format!("{what}: axis must be strictly increasing.")));
    }
    Ok(())
}

/// Piecewise-linear function `y(x)` defined by its nodes.
#[derive(Debug, Clone)]
pub struct Linear1d {
    x: Vec<f64>,
    y: Vec<f64>,
}

impl Linear1d {
    pub fn new(x: Vec<f64>, y: Vec<f64>) -> Result<Self, AppError> {
        if x.len() != y.len() {
            return Err(AppError::data(format!(
                "Interpolation table length mismatch: {} abscissae vs {} values.",
                x.len(),
                y.len()
            )));
        }
        check_axis(&x, "Interpolation table")?;
        Ok(Self { x, y })
    }

    pub fn eval(&self, v: f64) -> f64 {
        let i = cell_index(&self.x, v);
        let (x0, x1) = (self.x[i], self.x[i + 1]);
        let (y0, y1) = (self.y[i], self.y[i + 1]);
        if v == x0 {
            return y0;
        }
        y0 + (y1 - y0) * (v - x0) / (x1 - x0)
    }

    pub fn eval_many(&self, v: &[f64]) -> Vec<f64> {
        v.iter().map(|&vi| self.eval(vi)).collect()
    }
}

/// Resample `(x, y)` onto `x_new` with linear interpolation/extrapolation.
pub fn interp_extrapolate(x: &[f64], y: &[f64], x_new: &[f64]) -> Result<Vec<f64>, AppError> {
    let f = Linear1d::new(x.to_vec(), y.to_vec())?;
    Ok(f.eval_many(x_new))
}

/// Bilinear interpolation over a 2-D regular grid whose nodes each carry a
/// vector of values (for example a transmission spectrum per node).
///
/// `values[i * ny + j]` belongs to node `(ax[i], ay[j])`.
#[derive(Debug, Clone)]
pub struct RegularGrid2d {
    ax: Vec<f64>,
    ay: Vec<f64>,
    values: Vec<Vec<f64>>,
    width: usize,
}

impl RegularGrid2d {
    pub fn new(ax: Vec<f64>, ay: Vec<f64>, values: Vec<Vec<f64>>) -> Result<Self, AppError> {
        check_axis(&ax, "Grid first axis")?;
        check_axis(&ay, "Grid second axis")?;
        let expected = ax.len() * ay.len();
        if values.len() != expected {
            return Err(AppError::data(format!(
                "Grid has {} nodes, expected {} x {} = {expected}.",
                values.len(),
                ax.len(),
                ay.len()
            )));
        }
        let width = values.first().map_or(0, Vec::len);
        if values.iter().any(|row| row.len() != width) {
            return Err(AppError::data("Grid rows have inconsistent lengths."));
        }
        Ok(Self {
            ax,
            ay,
            values,
            width,
        })
    }

    pub fn width(&self) -> usize {
        self.width
    }

    /// Interpolate every component at `(a, b)`.
    pub fn eval(&self, a: f64, b: f64) -> Vec<f64> {
        let ny = self.ay.len();
        let i = cell_index(&self.ax, a);
        let j = cell_index(&self.ay, b);
        let ta = (a - self.ax[i]) / (self.ax[i + 1] - self.ax[i]);
        let tb = (b - self.ay[j]) / (self.ay[j + 1] - self.ay[j]);

        let corners = [
            (&self.values[i * ny + j], (1.0 - ta) * (1.0 - tb)),
            (&self.values[i * ny + j + 1], (1.0 - ta) * tb),
            (&self.values[(i + 1) * ny + j], ta * (1.0 - tb)),
            (&self.values[(i + 1) * ny + j + 1], ta * tb),
        ];

        let mut out = vec![0.0; self.width];
        for (row, weight) in corners {
            if weight == 0.0 {
                continue;
            }
            for (o, v) in out.iter_mut().zip(row.iter()) {
                *o += weight * v;
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn linear_hits_nodes_and_extrapolates() {
        let f = Linear1d::new(vec![0.0, 1.0, 2.0], vec![0.0, 10.0, 30.0]).unwrap();
        assert_eq!(f.eval(1.0), 10.0);
        assert_eq!(f.eval(0.5), 5.0);
        assert_eq!(f.eval(-1.0), -10.0);
        assert_eq!(f.eval(3.0), 50.0);
    }

    #[test]
    fn linear_rejects_unsorted_axis() {
        assert!(Linear1d::new(vec![0.0, 2.0, 1.0], vec![0.0; 3]).is_err());
        assert!(Linear1d::new(vec![0.0, 1.0], vec![0.0]).is_err());
    }

    #[test]
    fn grid_returns_tabulated_node_exactly() {
        let ax = vec![0.0, 1.0, 2.0];
        let ay = vec![10.0, 20.0];
        let values: Vec<Vec<f64>> = (0..6).map(|k| vec![k as f64, 0.25 * k as f64]).collect();
        let grid = RegularGrid2d::new(ax, ay, values).unwrap();
        assert_eq!(grid.eval(1.0, 20.0), vec![3.0, 0.75]);
        assert_eq!(grid.eval(2.0, 10.0), vec![4.0, 1.0]);
    }

    #[test]
    fn grid_is_bilinear_between_nodes() {
        let grid = RegularGrid2d::new(
            vec![0.0, 1.0],
            vec![0.0, 1.0],
            vec![vec![0.0], vec![1.0], vec![2.0], vec![3.0]],
        )
        .unwrap();
        // f(a, b) = 2a + b on the unit square, and beyond it.
        assert!((grid.eval(0.5, 0.5)[0] - 1.5).abs() < 1e-12);
        assert!((grid.eval(1.5, 0.0)[0] - 3.0).abs() < 1e-12);
    }
}
