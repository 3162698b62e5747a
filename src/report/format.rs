//! Terminal tables for the `params`, `run`, `evaluate` and `best-fit`
//! commands.

use crate::params::ParameterStore;
use crate::retrieval::{BestFit, Evaluation};
use crate::sampler::PosteriorSummary;

/// Registered parameters in cube order, free and fixed.
pub fn format_parameter_table(store: &ParameterStore) -> String {
    let mut out = String::new();
    push_line(
        &mut out,
        format!("{:<4} {:<24} {:>6} {:>12} {:>12} {:>12}", "dim", "name", "free", "lower", "upper", "value"),
    );
    push_line(
        &mut out,
        format!("{:-<4} {:-<24} {:-<6} {:-<12} {:-<12} {:-<12}", "", "", "", "", "", ""),
    );

    let mut dim = 0;
    for p in store.iter() {
        let index = if p.is_free {
            dim += 1;
            format!("{}", dim - 1)
        } else {
            String::new()
        };
        let (lower, upper) = if p.is_free {
            (fmt_num(p.prior.lower), fmt_num(p.prior.upper))
        } else {
            (String::new(), String::new())
        };
        let value = p.value.map(fmt_num).unwrap_or_default();
        push_line(
            &mut out,
            format!(
                "{:<4} {:<24} {:>6} {:>12} {:>12} {:>12}",
                index,
                truncate(&p.name, 24),
                if p.is_free { "yes" } else { "no" },
                lower,
                upper,
                value
            ),
        );
    }
    out.push_str(&format!("\n{} free parameters\n", store.n_free()));
    out
}

pub fn format_posterior_summary(summary: &PosteriorSummary) -> String {
    let mut out = String::new();
    out.push_str(&format!(
        "ln Z = {:.3} +/- {:.3} | max ln L = {:.3} | samples={} iterations={}\n\n",
        summary.log_evidence,
        summary.log_evidence_error,
        summary.max_log_likelihood,
        summary.n_samples,
        summary.n_iterations
    ));
    push_line(
        &mut out,
        format!("{:<24} {:>12} {:>12} {:>12} {:>12}", "name", "median", "mean", "sd", "max-like"),
    );
    push_line(&mut out, format!("{:-<24} {:-<12} {:-<12} {:-<12} {:-<12}", "", "", "", "", ""));
    for p in &summary.parameters {
        push_line(
            &mut out,
            format!(
                "{:<24} {:>12} {:>12} {:>12} {:>12}",
                truncate(&p.name, 24),
                fmt_num(p.median),
                fmt_num(p.mean),
                fmt_num(p.sd),
                fmt_num(p.maximum)
            ),
        );
    }
    out
}

/// Per-chip likelihood terms of one evaluation.
pub fn format_evaluation(evaluation: &Evaluation) -> String {
    let mut out = String::new();
    out.push_str(&format!("ln L = {:.4}\n\n", evaluation.log_likelihood));
    push_line(
        &mut out,
        format!("{:<12} {:>5} {:>14} {:>12} {:>12}", "instrument", "chip", "ln L", "scaling", "inflation"),
    );
    push_line(&mut out, format!("{:-<12} {:-<5} {:-<14} {:-<12} {:-<12}", "", "", "", "", ""));
    for inst in &evaluation.instruments {
        for (chip, fit) in inst.chips.iter().enumerate() {
            push_line(
                &mut out,
                format!(
                    "{:<12} {:>5} {:>14.4} {:>12} {:>12}",
                    truncate(&inst.name, 12),
                    chip,
                    fit.log_l,
                    fit.flux_scaling.map(fmt_num).unwrap_or_default(),
                    fit.err_inflation.map(fmt_num).unwrap_or_default()
                ),
            );
        }
    }
    out
}

pub fn format_best_fit(best: &BestFit) -> String {
    let mut out = String::new();
    out.push_str(&format!("Best fit ({:?}):\n", best.which));
    for (name, value) in best.names.iter().zip(&best.point) {
        out.push_str(&format!("- {name}: {}\n", fmt_num(*value)));
    }
    out.push('\n');
    out.push_str(&format_evaluation(&best.evaluation));
    out
}

fn push_line(out: &mut String, line: String) {
    out.push_str(line.trim_end());
    out.push('\n');
}

fn fmt_num(v: f64) -> String {
    let a = v.abs();
    if a != 0.0 && !(1e-3..1e5).contains(&a) {
        format!("{v:.4e}")
    } else {
        format!("{v:.4}")
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    let mut out: String = s.chars().take(max.saturating_sub(1)).collect();
    out.push('.');
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::Prior;

    #[test]
    fn parameter_table_numbers_free_dims_only() {
        let mut store = ParameterStore::new();
        store.add("distance", Some(10.0), Prior::UNIT, false).unwrap();
        store.add("vsini", None, (1.0, 50.0), true).unwrap();
        store.add("vsys", None, (-50.0, 50.0), true).unwrap();

        let table = format_parameter_table(&store);
        let lines: Vec<&str> = table.lines().collect();
        assert!(lines[2].starts_with("     distance"));
        assert!(lines[3].starts_with("0    vsini"));
        assert!(lines[4].starts_with("1    vsys"));
        assert!(table.ends_with("2 free parameters\n"));
    }

    #[test]
    fn numbers_switch_to_exponent_outside_range() {
        assert_eq!(fmt_num(12.5), "12.5000");
        assert_eq!(fmt_num(0.0), "0.0000");
        assert_eq!(fmt_num(1.2e5), "1.2000e5");
        assert_eq!(fmt_num(-5e-4), "-5.0000e-4");
    }

    #[test]
    fn long_names_are_truncated() {
        assert_eq!(truncate("poly_crires_1_00", 8), "poly_cr.");
        assert_eq!(truncate("vsini", 8), "vsini");
    }
}
