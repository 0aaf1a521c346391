use super::property::PropertyValue;
use crate::core::models::workspace::Workspace;

/// What a validator is asked to check.
#[derive(Debug, Clone, Copy)]
pub enum ValidationTarget<'a> {
    /// A scalar property value.
    Value(&'a PropertyValue),
    /// One workspace bound to a workspace property; group members are checked one by one.
    Workspace {
        name: &'a str,
        workspace: &'a Workspace,
    },
}

/// A per-property check run while an invocation moves from `Initialized` to `Running`.
///
/// Returns a message describing the problem, or `None` when the target is acceptable.
/// Closures of the matching signature are validators too.
pub trait Validator: Send + Sync {
    fn check(&self, target: ValidationTarget<'_>) -> Option<String>;
}

impl<F> Validator for F
where
    F: Fn(ValidationTarget<'_>) -> Option<String> + Send + Sync,
{
    fn check(&self, target: ValidationTarget<'_>) -> Option<String> {
        self(target)
    }
}

/// Accepts integers and floats (and every element of integer lists) within an
/// inclusive range.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundedValue {
    lower: Option<f64>,
    upper: Option<f64>,
}

impl BoundedValue {
    pub fn new(lower: Option<f64>, upper: Option<f64>) -> Self {
        Self { lower, upper }
    }

    pub fn at_least(lower: f64) -> Self {
        Self::new(Some(lower), None)
    }

    pub fn at_most(upper: f64) -> Self {
        Self::new(None, Some(upper))
    }

    fn check_number(&self, value: f64) -> Option<String> {
        if value.is_nan() {
            return Some("value is not a number".to_string());
        }
        match (self.lower, self.upper) {
            (Some(lo), _) if value < lo => Some(format!("{value} is below the lower bound {lo}")),
            (_, Some(hi)) if value > hi => Some(format!("{value} is above the upper bound {hi}")),
            _ => None,
        }
    }
}

impl Validator for BoundedValue {
    fn check(&self, target: ValidationTarget<'_>) -> Option<String> {
        match target {
            ValidationTarget::Value(PropertyValue::Integer(v)) => self.check_number(*v as f64),
            ValidationTarget::Value(PropertyValue::Float(v)) => self.check_number(*v),
            ValidationTarget::Value(PropertyValue::IntegerList(values)) => values
                .iter()
                .find_map(|v| self.check_number(*v as f64)),
            _ => None,
        }
    }
}

/// Rejects empty or whitespace-only text.
#[derive(Debug, Clone, Copy, Default)]
pub struct NonEmptyText;

impl Validator for NonEmptyText {
    fn check(&self, target: ValidationTarget<'_>) -> Option<String> {
        match target {
            ValidationTarget::Value(PropertyValue::Text(text)) if text.trim().is_empty() => {
                Some("text must not be empty".to_string())
            }
            _ => None,
        }
    }
}

/// Requires a workspace to hold at least the given number of spectra.
#[derive(Debug, Clone, Copy)]
pub struct MinimumSize(pub usize);

impl Validator for MinimumSize {
    fn check(&self, target: ValidationTarget<'_>) -> Option<String> {
        match target {
            ValidationTarget::Workspace { name, workspace } if workspace.size() < self.0 => {
                Some(format!(
                    "workspace '{}' has {} spectra, at least {} required",
                    name,
                    workspace.size(),
                    self.0
                ))
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bounded_value_checks_integers_floats_and_lists() {
        let positive = BoundedValue::at_least(1.0);
        assert!(positive.check(ValidationTarget::Value(&PropertyValue::Integer(1))).is_none());
        assert!(positive.check(ValidationTarget::Value(&PropertyValue::Integer(0))).is_some());
        assert!(positive.check(ValidationTarget::Value(&PropertyValue::Float(f64::NAN))).is_some());
        assert!(
            positive
                .check(ValidationTarget::Value(&PropertyValue::IntegerList(vec![3, -1])))
                .is_some()
        );

        let capped = BoundedValue::at_most(2.5);
        let message = capped
            .check(ValidationTarget::Value(&PropertyValue::Float(3.0)))
            .unwrap();
        assert!(message.contains("upper bound"));
    }

    #[test]
    fn non_empty_text_ignores_other_kinds() {
        assert!(NonEmptyText.check(ValidationTarget::Value(&"  ".into())).is_some());
        assert!(NonEmptyText.check(ValidationTarget::Value(&"title".into())).is_none());
        assert!(NonEmptyText.check(ValidationTarget::Value(&PropertyValue::Integer(0))).is_none());
    }

    #[test]
    fn minimum_size_names_the_workspace() {
        let ws = Workspace::filled("small", 1, 2, 0.0, 1);
        let message = MinimumSize(2)
            .check(ValidationTarget::Workspace {
                name: "small_ws",
                workspace: &ws,
            })
            .unwrap();
        assert!(message.contains("small_ws"));
        assert!(
            MinimumSize(1)
                .check(ValidationTarget::Workspace {
                    name: "small_ws",
                    workspace: &ws,
                })
                .is_none()
        );
    }

    #[test]
    fn closures_are_validators() {
        let even = |target: ValidationTarget<'_>| match target {
            ValidationTarget::Value(PropertyValue::Integer(v)) if v % 2 != 0 => {
                Some("must be even".to_string())
            }
            _ => None,
        };
        assert_eq!(
            even.check(ValidationTarget::Value(&PropertyValue::Integer(3))),
            Some("must be even".to_string())
        );
    }
}
