//! Element masses and a small chemical-formula parser for molar masses.

use crate::error::AppError;

/// Molar mass of the free electron (g/mol, NIST CODATA).
pub const ELECTRON_MOLAR_MASS: f64 = 5.485_799_088_8e-4;

/// `(symbol, mass number of the most abundant isotope, standard atomic weight)`.
const ELEMENTS: &[(&str, u32, f64)] = &[
    ("H", 1, 1.008),
    ("He", 4, 4.002_602),
    ("Li", 7, 6.94),
    ("Be", 9, 9.012_183_1),
    ("B", 11, 10.81),
    ("C", 12, 12.011),
    ("N", 14, 14.007),
    ("O", 16, 15.999),
    ("F", 19, 18.998_403_163),
    ("Ne", 20, 20.1797),
    ("Na", 23, 22.989_769_28),
    ("Mg", 24, 24.305),
    ("Al", 27, 26.981_538_5),
    ("Si", 28, 28.085),
    ("P", 31, 30.973_761_998),
    ("S", 32, 32.06),
    ("Cl", 35, 35.45),
    ("Ar", 40, 39.948),
    ("K", 39, 39.0983),
    ("Ca", 40, 40.078),
    ("Sc", 45, 44.955_908),
    ("Ti", 48, 47.867),
    ("V", 51, 50.9415),
    ("Cr", 52, 51.9961),
    ("Mn", 55, 54.938_044),
    ("Fe", 56, 55.845),
    ("Co", 59, 58.933_194),
    ("Ni", 58, 58.6934),
    ("Cu", 63, 63.546),
    ("Zn", 64, 65.38),
    ("Rb", 85, 85.4678),
    ("Sr", 88, 87.62),
    ("Y", 89, 88.905_84),
    ("Zr", 90, 91.224),
    ("Cs", 133, 132.905_451_96),
    ("Ba", 138, 137.327),
];

fn lookup(symbol: &str) -> Option<(u32, f64)> {
    ELEMENTS
        .iter()
        .find(|(s, _, _)| *s == symbol)
        .map(|&(_, number, weight)| (number, weight))
}

/// Parsed formula as `(element symbol, count)` pairs.
#[derive(Debug, Clone, PartialEq)]
pub struct Formula {
    atoms: Vec<(String, u32)>,
}

impl Formula {
    /// Parse formulas such as `H2O`, `CO2`, `FeH`, or `Ca(OH)2`.
    pub fn parse(text: &str) -> Result<Self, AppError> {
        let chars: Vec<char> = text.trim_end_matches(['+', '-']).chars().collect();
        let mut pos = 0;
        let atoms = parse_group(&chars, &mut pos, text)?;
        if pos != chars.len() {
            return Err(AppError::config(format!("Unbalanced parenthesis in formula '{text}'.")));
        }
        if atoms.is_empty() {
            return Err(AppError::config(format!("Empty chemical formula '{text}'.")));
        }
        Ok(Self { atoms })
    }

    /// Mass number of the most abundant isotopologue.
    pub fn mass_number(&self) -> Result<f64, AppError> {
        self.sum(|number, _| number as f64)
    }

    /// Natural-abundance-weighted molar mass.
    pub fn average_mass(&self) -> Result<f64, AppError> {
        self.sum(|_, weight| weight)
    }

    fn sum(&self, pick: impl Fn(u32, f64) -> f64) -> Result<f64, AppError> {
        let mut total = 0.0;
        for (symbol, count) in &self.atoms {
            let (number, weight) = lookup(symbol)
                .ok_or_else(|| AppError::config(format!("Unknown element '{symbol}'.")))?;
            total += pick(number, weight) * *count as f64;
        }
        Ok(total)
    }
}

fn parse_count(chars: &[char], pos: &mut usize, text: &str) -> Result<u32, AppError> {
    let start = *pos;
    while *pos < chars.len() && chars[*pos].is_ascii_digit() {
        *pos += 1;
    }
    if start == *pos {
        return Ok(1);
    }
    let digits: String = chars[start..*pos].iter().collect();
    match digits.parse::<u32>() {
        Ok(n) if n > 0 => Ok(n),
        _ => Err(AppError::config(format!("Invalid atom count '{digits}' in formula '{text}'."))),
    }
}

fn parse_group(chars: &[char], pos: &mut usize, text: &str) -> Result<Vec<(String, u32)>, AppError> {
    let mut atoms: Vec<(String, u32)> = Vec::new();
    while *pos < chars.len() {
        let c = chars[*pos];
        if c == '(' {
            *pos += 1;
            let inner = parse_group(chars, pos, text)?;
            if *pos >= chars.len() || chars[*pos] != ')' {
                return Err(AppError::config(format!("Unbalanced parenthesis in formula '{text}'.")));
            }
            *pos += 1;
            let mult = parse_count(chars, pos, text)?;
            for (symbol, n) in inner {
                let n = n
                    .checked_mul(mult)
                    .ok_or_else(|| AppError::config(format!("Atom count overflows in formula '{text}'.")))?;
                atoms.push((symbol, n));
            }
        } else if c == ')' {
            break;
        } else if c.is_ascii_uppercase() {
            let mut symbol = c.to_string();
            *pos += 1;
            while *pos < chars.len() && chars[*pos].is_ascii_lowercase() {
                symbol.push(chars[*pos]);
                *pos += 1;
            }
            let count = parse_count(chars, pos, text)?;
            atoms.push((symbol, count));
        } else {
            return Err(AppError::config(format!(
                "Unexpected character '{c}' in formula '{text}'."
            )));
        }
    }
    Ok(atoms)
}

/// Molar mass (g/mol) of an opacity species name.
///
/// Tags after the first `_` (and anything after a `,`) are ignored for the
/// formula. Names containing `all_iso` use the natural-abundance weight;
/// everything else uses the most abundant isotope's mass number.
pub fn molar_mass(species: &str) -> Result<f64, AppError> {
    match species {
        "e-" => return Ok(ELECTRON_MOLAR_MASS),
        "H-" => return Ok(Formula::parse("H")?.average_mass()? + ELECTRON_MOLAR_MASS),
        _ => {}
    }

    let name = species.split('_').next().unwrap_or(species);
    let name = name.split(',').next().unwrap_or(name);
    let formula = Formula::parse(name)?;

    if species.contains("all_iso") {
        formula.average_mass()
    } else {
        formula.mass_number()
    }
}
