//! The closed set of names an expression may refer to.
//!
//! [`AllowedSymbols::standard`] is built once per process and never changes afterwards.
//! Nothing typed by a user can add to it: user variables live in a separate value map
//! and can never be called.

use crate::error::EvalError;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::OnceLock;

/// Largest magnitude any value may reach during evaluation.
pub const MAX_SAFE_NUMBER: f64 = 1e30;
/// Largest exponent magnitude accepted by `**`, `^` and `pow`.
pub const MAX_EXPONENT: f64 = 100.0;
/// Upper bound on the number of arguments any call may pass.
pub const MAX_ARGS: usize = 1000;

const MAX_FACTORIAL_N: f64 = 170.0;
const MAX_COMBINATORICS_N: f64 = 1000.0;
/// Integers above this are no longer exact in an `f64`.
const MAX_EXACT_INT: f64 = 9_007_199_254_740_992.0;

/// How many arguments a builtin accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arity {
    Exactly(usize),
    AtLeast(usize),
}

impl Arity {
    pub fn accepts(self, n: usize) -> bool {
        match self {
            Arity::Exactly(k) => n == k,
            Arity::AtLeast(k) => n >= k && n <= MAX_ARGS,
        }
    }
}

impl fmt::Display for Arity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Arity::Exactly(k) => write!(f, "{}", k),
            Arity::AtLeast(k) => write!(f, "at least {}", k),
        }
    }
}

/// Every function an expression may call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Builtin {
    Abs,
    Round,
    Floor,
    Ceil,
    Int,
    Sqrt,
    Exp,
    Log,
    Log2,
    Log10,
    Sin,
    Cos,
    Tan,
    Asin,
    Acos,
    Atan,
    Radians,
    Degrees,
    Factorial,
    Pow,
    Atan2,
    Hypot,
    Gcd,
    Lcm,
    Comb,
    Perm,
    Percent,
    Min,
    Max,
    Sum,
    Mean,
    Median,
    Mode,
    Stdev,
    Pstdev,
    Variance,
    Pvariance,
}

impl Builtin {
    const ALL: [Builtin; 37] = [
        Builtin::Abs,
        Builtin::Round,
        Builtin::Floor,
        Builtin::Ceil,
        Builtin::Int,
        Builtin::Sqrt,
        Builtin::Exp,
        Builtin::Log,
        Builtin::Log2,
        Builtin::Log10,
        Builtin::Sin,
        Builtin::Cos,
        Builtin::Tan,
        Builtin::Asin,
        Builtin::Acos,
        Builtin::Atan,
        Builtin::Radians,
        Builtin::Degrees,
        Builtin::Factorial,
        Builtin::Pow,
        Builtin::Atan2,
        Builtin::Hypot,
        Builtin::Gcd,
        Builtin::Lcm,
        Builtin::Comb,
        Builtin::Perm,
        Builtin::Percent,
        Builtin::Min,
        Builtin::Max,
        Builtin::Sum,
        Builtin::Mean,
        Builtin::Median,
        Builtin::Mode,
        Builtin::Stdev,
        Builtin::Pstdev,
        Builtin::Variance,
        Builtin::Pvariance,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Builtin::Abs => "abs",
            Builtin::Round => "round",
            Builtin::Floor => "floor",
            Builtin::Ceil => "ceil",
            Builtin::Int => "int",
            Builtin::Sqrt => "sqrt",
            Builtin::Exp => "exp",
            Builtin::Log => "log",
            Builtin::Log2 => "log2",
            Builtin::Log10 => "log10",
            Builtin::Sin => "sin",
            Builtin::Cos => "cos",
            Builtin::Tan => "tan",
            Builtin::Asin => "asin",
            Builtin::Acos => "acos",
            Builtin::Atan => "atan",
            Builtin::Radians => "radians",
            Builtin::Degrees => "degrees",
            Builtin::Factorial => "factorial",
            Builtin::Pow => "pow",
            Builtin::Atan2 => "atan2",
            Builtin::Hypot => "hypot",
            Builtin::Gcd => "gcd",
            Builtin::Lcm => "lcm",
            Builtin::Comb => "comb",
            Builtin::Perm => "perm",
            Builtin::Percent => "percent",
            Builtin::Min => "min",
            Builtin::Max => "max",
            Builtin::Sum => "sum",
            Builtin::Mean => "mean",
            Builtin::Median => "median",
            Builtin::Mode => "mode",
            Builtin::Stdev => "stdev",
            Builtin::Pstdev => "pstdev",
            Builtin::Variance => "variance",
            Builtin::Pvariance => "pvariance",
        }
    }

    pub fn arity(self) -> Arity {
        use Builtin::*;
        match self {
            Pow | Atan2 | Hypot | Gcd | Lcm | Comb | Perm | Percent => Arity::Exactly(2),
            Min | Max | Sum | Mean | Median | Mode | Pstdev | Pvariance => Arity::AtLeast(1),
            Stdev | Variance => Arity::AtLeast(2),
            _ => Arity::Exactly(1),
        }
    }

    /// Applies the function. A wrong number of arguments is [`EvalError::WrongArity`].
    pub fn apply(self, args: &[f64]) -> Result<f64, EvalError> {
        use Builtin::*;
        let name = self.name();
        let arity = self.arity();
        if !arity.accepts(args.len()) {
            return Err(EvalError::WrongArity {
                name: name.to_string(),
                expected: arity.to_string(),
                found: args.len(),
            });
        }
        let domain = || EvalError::Domain(name.to_string());
        let x = args.first().copied().unwrap_or(0.0);
        let y = args.get(1).copied().unwrap_or(0.0);

        match self {
            Abs => Ok(x.abs()),
            Round => Ok(x.round_ties_even()),
            Floor => Ok(x.floor()),
            Ceil => Ok(x.ceil()),
            Int => Ok(x.trunc()),
            Sqrt if x < 0.0 => Err(domain()),
            Sqrt => Ok(x.sqrt()),
            Exp => Ok(x.exp()),
            Log | Log2 | Log10 if x <= 0.0 => Err(domain()),
            Log => Ok(x.ln()),
            Log2 => Ok(x.log2()),
            Log10 => Ok(x.log10()),
            Sin => Ok(x.sin()),
            Cos => Ok(x.cos()),
            Tan => Ok(x.tan()),
            Asin | Acos if !(-1.0..=1.0).contains(&x) => Err(domain()),
            Asin => Ok(x.asin()),
            Acos => Ok(x.acos()),
            Atan => Ok(x.atan()),
            Radians => Ok(x.to_radians()),
            Degrees => Ok(x.to_degrees()),
            Factorial => {
                let n = whole_number(name, x, MAX_FACTORIAL_N)?;
                Ok((1..=n).fold(1.0, |acc, i| acc * i as f64))
            }
            Pow => power(x, y),
            Atan2 => Ok(x.atan2(y)),
            Hypot => Ok(x.hypot(y)),
            Gcd => {
                let (a, b) = (signed_whole(name, x)?, signed_whole(name, y)?);
                Ok(gcd(a, b) as f64)
            }
            Lcm => {
                let (a, b) = (signed_whole(name, x)?, signed_whole(name, y)?);
                if a == 0 || b == 0 {
                    return Ok(0.0);
                }
                Ok(((a / gcd(a, b)) as f64 * b as f64).abs())
            }
            Comb => {
                let n = whole_number(name, x, MAX_COMBINATORICS_N)?;
                let k = whole_number(name, y, MAX_COMBINATORICS_N)?;
                if k > n {
                    return Ok(0.0);
                }
                let k = k.min(n - k);
                Ok((1..=k).fold(1.0, |acc, i| acc * (n - k + i) as f64 / i as f64).round())
            }
            Perm => {
                let n = whole_number(name, x, MAX_COMBINATORICS_N)?;
                let k = whole_number(name, y, MAX_COMBINATORICS_N)?;
                if k > n {
                    return Ok(0.0);
                }
                Ok((n - k + 1..=n).fold(1.0, |acc, i| acc * i as f64))
            }
            Percent => Ok(x * y / 100.0),
            Min => Ok(args.iter().copied().fold(f64::INFINITY, f64::min)),
            Max => Ok(args.iter().copied().fold(f64::NEG_INFINITY, f64::max)),
            Sum => Ok(args.iter().sum()),
            Mean => Ok(mean(args)),
            Median => {
                let mut sorted = args.to_vec();
                sorted.sort_by(f64::total_cmp);
                let mid = sorted.len() / 2;
                if sorted.len() % 2 == 0 {
                    Ok((sorted[mid - 1] + sorted[mid]) / 2.0)
                } else {
                    Ok(sorted[mid])
                }
            }
            Mode => Ok(mode(args)),
            Stdev => Ok((sum_sq_dev(args) / (args.len() - 1) as f64).sqrt()),
            Pstdev => Ok((sum_sq_dev(args) / args.len() as f64).sqrt()),
            Variance => Ok(sum_sq_dev(args) / (args.len() - 1) as f64),
            Pvariance => Ok(sum_sq_dev(args) / args.len() as f64),
        }
    }
}

/// Raises `base` to `exponent`, refusing exponents that would explode.
pub fn power(base: f64, exponent: f64) -> Result<f64, EvalError> {
    if exponent.abs() > MAX_EXPONENT {
        return Err(EvalError::Overflow);
    }
    if base == 0.0 && exponent < 0.0 {
        return Err(EvalError::DivisionByZero);
    }
    if base < 0.0 && exponent.fract() != 0.0 {
        return Err(EvalError::Domain("pow".to_string()));
    }
    Ok(base.powf(exponent))
}

fn whole_number(name: &str, x: f64, max: f64) -> Result<u64, EvalError> {
    if !x.is_finite() || x.fract() != 0.0 || x < 0.0 || x > max {
        return Err(EvalError::Domain(name.to_string()));
    }
    Ok(x as u64)
}

fn signed_whole(name: &str, x: f64) -> Result<i64, EvalError> {
    if !x.is_finite() || x.fract() != 0.0 || x.abs() > MAX_EXACT_INT {
        return Err(EvalError::Domain(name.to_string()));
    }
    Ok(x as i64)
}

fn gcd(a: i64, b: i64) -> i64 {
    let (mut a, mut b) = (a.abs(), b.abs());
    while b != 0 {
        (a, b) = (b, a % b);
    }
    a
}

fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

fn sum_sq_dev(values: &[f64]) -> f64 {
    let m = mean(values);
    values.iter().map(|v| (v - m) * (v - m)).sum()
}

/// Most common value; ties go to the value seen first.
fn mode(values: &[f64]) -> f64 {
    let mut counts: Vec<(f64, usize)> = Vec::new();
    for &v in values {
        match counts.iter_mut().find(|(seen, _)| *seen == v) {
            Some((_, count)) => *count += 1,
            None => counts.push((v, 1)),
        }
    }
    let mut best = counts[0];
    for &(v, count) in &counts[1..] {
        if count > best.1 {
            best = (v, count);
        }
    }
    best.0
}

/// What a name in the closed set stands for.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Symbol {
    Constant(f64),
    Function(Builtin),
}

/// The closed, enumerable AllowedSymbol set.
#[derive(Debug)]
pub struct AllowedSymbols {
    symbols: BTreeMap<&'static str, Symbol>,
}

impl AllowedSymbols {
    /// The process-wide symbol set: math constants, science constants and builtins.
    pub fn standard() -> &'static AllowedSymbols {
        static STANDARD: OnceLock<AllowedSymbols> = OnceLock::new();
        STANDARD.get_or_init(|| {
            let mut symbols = BTreeMap::new();
            for (name, value) in CONSTANTS {
                symbols.insert(*name, Symbol::Constant(*value));
            }
            for builtin in Builtin::ALL {
                symbols.insert(builtin.name(), Symbol::Function(builtin));
            }
            AllowedSymbols { symbols }
        })
    }

    pub fn lookup(&self, name: &str) -> Option<Symbol> {
        self.symbols.get(name).copied()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.symbols.contains_key(name)
    }

    /// All names in the set, sorted.
    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.symbols.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }
}

const CONSTANTS: &[(&str, f64)] = &[
    ("pi", std::f64::consts::PI),
    ("e", std::f64::consts::E),
    ("tau", std::f64::consts::TAU),
    ("phi", 1.618_033_988_749_895),
    // speed of light, m/s
    ("c", 299_792_458.0),
    // standard gravity, m/s^2
    ("g", 9.806_65),
    // gravitational constant
    ("G", 6.674_30e-11),
    // Planck constant
    ("h", 6.626_070_15e-34),
    // Boltzmann constant
    ("k", 1.380_649e-23),
    // molar gas constant
    ("R", 8.314_462_618_153_24),
    // Avogadro constant
    ("NA", 6.022_140_76e23),
    // Stefan-Boltzmann constant
    ("sigma", 5.670_374_419e-8),
];

#[cfg(test)]
mod tests {
    use super::*;

    fn call(b: Builtin, args: &[f64]) -> Result<f64, EvalError> {
        assert!(b.arity().accepts(args.len()));
        b.apply(args)
    }

    #[test]
    fn standard_set_is_closed_and_shared() {
        let a = AllowedSymbols::standard();
        let b = AllowedSymbols::standard();
        assert!(std::ptr::eq(a, b));
        assert_eq!(a.len(), CONSTANTS.len() + Builtin::ALL.len());
        assert!(a.contains("sqrt"));
        assert!(a.contains("pi"));
        assert!(!a.contains("import"));
        assert!(!a.contains("__class__"));
    }

    #[test]
    fn arity_bounds() {
        assert!(Arity::Exactly(2).accepts(2));
        assert!(!Arity::Exactly(2).accepts(3));
        assert!(Arity::AtLeast(1).accepts(MAX_ARGS));
        assert!(!Arity::AtLeast(1).accepts(MAX_ARGS + 1));
        assert!(!Arity::AtLeast(2).accepts(1));
        assert_eq!(Arity::AtLeast(2).to_string(), "at least 2");
    }

    #[test]
    fn integer_functions() {
        assert_eq!(call(Builtin::Factorial, &[5.0]), Ok(120.0));
        assert_eq!(call(Builtin::Factorial, &[0.0]), Ok(1.0));
        assert_eq!(
            call(Builtin::Factorial, &[2.5]),
            Err(EvalError::Domain("factorial".into()))
        );
        assert_eq!(
            call(Builtin::Factorial, &[171.0]),
            Err(EvalError::Domain("factorial".into()))
        );
        assert_eq!(call(Builtin::Comb, &[5.0, 2.0]), Ok(10.0));
        assert_eq!(call(Builtin::Perm, &[5.0, 2.0]), Ok(20.0));
        assert_eq!(call(Builtin::Comb, &[2.0, 5.0]), Ok(0.0));
        assert_eq!(call(Builtin::Gcd, &[12.0, 18.0]), Ok(6.0));
        assert_eq!(call(Builtin::Lcm, &[4.0, 6.0]), Ok(12.0));
    }

    #[test]
    fn statistics() {
        assert_eq!(call(Builtin::Mean, &[1.0, 2.0, 3.0]), Ok(2.0));
        assert_eq!(call(Builtin::Median, &[3.0, 1.0, 2.0, 10.0]), Ok(2.5));
        assert_eq!(call(Builtin::Mode, &[1.0, 2.0, 2.0, 3.0]), Ok(2.0));
        assert_eq!(call(Builtin::Variance, &[2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0]), Ok(32.0 / 7.0));
        assert_eq!(call(Builtin::Pvariance, &[2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0]), Ok(4.0));
        assert_eq!(call(Builtin::Pstdev, &[2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0]), Ok(2.0));
        assert_eq!(call(Builtin::Min, &[3.0, 5.0, 1.0]), Ok(1.0));
        assert_eq!(call(Builtin::Max, &[3.0, 5.0, 1.0]), Ok(5.0));
        assert_eq!(call(Builtin::Sum, &[1.0, 2.0, 3.0]), Ok(6.0));
    }

    #[test]
    fn domain_errors() {
        assert_eq!(call(Builtin::Sqrt, &[-1.0]), Err(EvalError::Domain("sqrt".into())));
        assert_eq!(call(Builtin::Log, &[0.0]), Err(EvalError::Domain("log".into())));
        assert_eq!(call(Builtin::Asin, &[2.0]), Err(EvalError::Domain("asin".into())));
    }

    #[test]
    fn power_limits() {
        assert_eq!(power(2.0, 10.0), Ok(1024.0));
        assert_eq!(power(2.0, 101.0), Err(EvalError::Overflow));
        assert_eq!(power(0.0, -1.0), Err(EvalError::DivisionByZero));
        assert_eq!(power(-8.0, 0.5), Err(EvalError::Domain("pow".into())));
    }

    #[test]
    fn round_half_to_even() {
        assert_eq!(call(Builtin::Round, &[2.5]), Ok(2.0));
        assert_eq!(call(Builtin::Round, &[3.7]), Ok(4.0));
    }

    #[test]
    fn apply_checks_the_argument_count() {
        for builtin in [Builtin::Median, Builtin::Mode, Builtin::Mean, Builtin::Sqrt] {
            assert!(matches!(builtin.apply(&[]), Err(EvalError::WrongArity { found: 0, .. })));
        }
        assert!(matches!(
            Builtin::Stdev.apply(&[1.0]),
            Err(EvalError::WrongArity { found: 1, .. })
        ));
        assert_eq!(call(Builtin::Median, &[3.0, 1.0]), Ok(2.0));
        assert_eq!(call(Builtin::Mode, &[1.0, 2.0, 2.0]), Ok(2.0));
    }
}
