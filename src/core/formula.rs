//! Model formulas.
//!
//! Supported syntax is deliberately small:
//!
//! - `y ~ a + b` main effects with an implicit intercept
//! - `y ~ 1` intercept only
//! - `y ~ a - 1` or `y ~ 0 + a` without intercept
//! - `y ~ a | fe1 + fe2` fixed effects after the separator
//! - `~ g` one-sided formulas for weights, clusters, strata and PSU ids

use crate::error::{Error, Result};
use std::fmt;

/// Token separating covariates from fixed-effect variables.
pub const FIXED_EFFECTS_SEPARATOR: char = '|';

/// A parsed model formula.
#[derive(Debug, Clone, PartialEq)]
pub struct Formula {
    response: Option<String>,
    terms: Vec<String>,
    intercept: bool,
    fixed_effects: Vec<String>,
}

impl Formula {
    /// Parse a formula string.
    pub fn parse(text: &str) -> Result<Self> {
        let invalid = |hint: &str| Error::InvalidFormula {
            formula: text.to_string(),
            hint: hint.to_string(),
        };

        let (lhs, rhs) = text
            .split_once('~')
            .ok_or_else(|| invalid("a formula needs a `~`"))?;
        if rhs.contains('~') {
            return Err(invalid("only one `~` is allowed"));
        }

        let response = match lhs.trim() {
            "" => None,
            name => {
                check_identifier(name).map_err(|_| invalid("the response must be a column name"))?;
                Some(name.to_string())
            }
        };

        let (linear, fe_part) = match rhs.split_once(FIXED_EFFECTS_SEPARATOR) {
            Some((linear, fe)) => (linear, Some(fe)),
            None => (rhs, None),
        };

        let mut intercept = true;
        let mut terms = Vec::new();
        for (negated, token) in signed_tokens(linear) {
            match token.as_str() {
                "" => return Err(invalid("empty term")),
                "1" => intercept = !negated,
                "0" => intercept = negated,
                name => {
                    check_identifier(name).map_err(|hint| invalid(&hint))?;
                    if negated {
                        terms.retain(|t| t != name);
                    } else if !terms.iter().any(|t| t == name) {
                        terms.push(name.to_string());
                    }
                }
            }
        }

        let mut fixed_effects = Vec::new();
        if let Some(fe) = fe_part {
            for (negated, token) in signed_tokens(fe) {
                if negated {
                    return Err(invalid("fixed effects cannot be removed with `-`"));
                }
                if token.is_empty() {
                    return Err(invalid("no fixed-effect variables after `|`"));
                }
                check_identifier(&token).map_err(|hint| invalid(&hint))?;
                if !fixed_effects.contains(&token) {
                    fixed_effects.push(token);
                }
            }
        }

        Ok(Self {
            response,
            terms,
            intercept,
            fixed_effects,
        })
    }

    /// Outcome variable, if the formula is two-sided.
    pub fn response(&self) -> Option<&str> {
        self.response.as_deref()
    }

    /// Covariate names in order of appearance.
    pub fn terms(&self) -> &[String] {
        &self.terms
    }

    /// Whether the linear part has an intercept.
    pub fn has_intercept(&self) -> bool {
        self.intercept
    }

    /// Fixed-effect variables after the separator.
    pub fn fixed_effects(&self) -> &[String] {
        &self.fixed_effects
    }

    /// Every variable the formula references.
    pub fn variables(&self) -> Vec<String> {
        self.response
            .iter()
            .chain(self.terms.iter())
            .chain(self.fixed_effects.iter())
            .cloned()
            .collect()
    }

    /// The formula without its fixed-effects part.
    pub fn linear_part(&self) -> Formula {
        Formula {
            fixed_effects: Vec::new(),
            ..self.clone()
        }
    }

    /// The formula with the given fixed effects appended.
    pub fn with_fixed_effects(&self, names: &[String]) -> Formula {
        let mut fixed_effects = self.fixed_effects.clone();
        for name in names {
            if !fixed_effects.contains(name) {
                fixed_effects.push(name.clone());
            }
        }
        Formula {
            fixed_effects,
            ..self.clone()
        }
    }

    /// Variable names of a one-sided formula such as `~ a + b`.
    ///
    /// `~1` and `~0` yield an empty list.
    pub fn one_sided_variables(text: &str) -> Result<Vec<String>> {
        let formula = Formula::parse(text)?;
        if formula.response.is_some() || !formula.fixed_effects.is_empty() {
            return Err(Error::InvalidFormula {
                formula: text.to_string(),
                hint: "expected a one-sided formula such as `~ group`".to_string(),
            });
        }
        Ok(formula.terms)
    }
}

impl fmt::Display for Formula {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(response) = &self.response {
            write!(f, "{response} ")?;
        }
        write!(f, "~ ")?;

        let mut parts: Vec<String> = self.terms.clone();
        if parts.is_empty() {
            parts.push(if self.intercept { "1" } else { "0" }.to_string());
        } else if !self.intercept {
            parts.push("-1".to_string());
        }
        write!(f, "{}", parts.join(" + ").replace("+ -1", "- 1"))?;

        if !self.fixed_effects.is_empty() {
            write!(f, " | {}", self.fixed_effects.join(" + "))?;
        }
        Ok(())
    }
}

/// Split `a + b - c` into `(negated, token)` pairs.
fn signed_tokens(text: &str) -> Vec<(bool, String)> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut negated = false;

    for ch in text.chars() {
        match ch {
            '+' | '-' => {
                let token = current.trim().to_string();
                if !token.is_empty() || !tokens.is_empty() || negated {
                    tokens.push((negated, token));
                }
                current.clear();
                negated = ch == '-';
            }
            _ => current.push(ch),
        }
    }
    tokens.push((negated, current.trim().to_string()));
    tokens
}

fn check_identifier(name: &str) -> std::result::Result<(), String> {
    let valid = name
        .chars()
        .all(|c| c.is_alphanumeric() || c == '_' || c == '.')
        && !name.chars().next().is_some_and(|c| c.is_ascii_digit());
    if valid {
        Ok(())
    } else {
        Err(format!(
            "`{name}` is not a column name; interactions and transformations are not supported"
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_simple() {
        let f = Formula::parse("mpg ~ hp + wt").unwrap();
        assert_eq!(f.response(), Some("mpg"));
        assert_eq!(f.terms(), &["hp", "wt"]);
        assert!(f.has_intercept());
        assert!(f.fixed_effects().is_empty());
    }

    #[test]
    fn test_parse_intercept_only() {
        let f = Formula::parse("y ~ 1").unwrap();
        assert!(f.terms().is_empty());
        assert!(f.has_intercept());
        assert_eq!(f.to_string(), "y ~ 1");
    }

    #[test]
    fn test_parse_no_intercept() {
        let f = Formula::parse("y ~ x - 1").unwrap();
        assert_eq!(f.terms(), &["x"]);
        assert!(!f.has_intercept());

        let f = Formula::parse("y ~ 0 + x").unwrap();
        assert!(!f.has_intercept());
    }

    #[test]
    fn test_parse_fixed_effects() {
        let f = Formula::parse("y ~ x1 + x2 | firm + year").unwrap();
        assert_eq!(f.terms(), &["x1", "x2"]);
        assert_eq!(f.fixed_effects(), &["firm", "year"]);
        assert!(f.linear_part().fixed_effects().is_empty());
        assert_eq!(f.to_string(), "y ~ x1 + x2 | firm + year");
    }

    #[test]
    fn test_one_sided() {
        assert_eq!(Formula::one_sided_variables("~ state").unwrap(), vec!["state"]);
        assert!(Formula::one_sided_variables("~1").unwrap().is_empty());
        assert!(Formula::one_sided_variables("y ~ state").is_err());
    }

    #[test]
    fn test_rejects_interactions() {
        assert!(matches!(
            Formula::parse("y ~ a:b"),
            Err(Error::InvalidFormula { .. })
        ));
        assert!(Formula::parse("y ~ log(x)").is_err());
        assert!(Formula::parse("y + x").is_err());
        assert!(Formula::parse("y ~ x |").is_err());
    }

    #[test]
    fn test_variables() {
        let f = Formula::parse("y ~ x | g").unwrap();
        assert_eq!(f.variables(), vec!["y", "x", "g"]);
    }
}
