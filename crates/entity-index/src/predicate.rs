//! Typed predicate trees over an entity's fields.
//!
//! Leaves bind an operator to a field name and a value. A leaf may also
//! carry a [`Matchable`] implementation, which lets callers evaluate it
//! directly against an in-memory entity at a declared cost.

use std::fmt;
use std::sync::Arc;

/// In-memory evaluation capability of a predicate leaf.
pub trait Matchable<E>: Send + Sync {
    fn matches(&self, entity: &E) -> bool;

    /// Relative cost of evaluating `matches`; cheaper leaves run first.
    fn cost(&self) -> u32 {
        1
    }
}

/// Operator applied by a leaf predicate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operator {
    /// Field value equals the given value
    Equals,
    /// Field value starts with the given value
    Prefix,
    /// Field text contains every term of the given value
    Contains,
}

impl Operator {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operator::Equals => "=",
            Operator::Prefix => "prefix",
            Operator::Contains => "contains",
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Leaf predicate: `field <operator> value`.
pub struct OperatorPredicate<E> {
    field: String,
    operator: Operator,
    value: String,
    matcher: Option<Arc<dyn Matchable<E>>>,
}

impl<E> OperatorPredicate<E> {
    pub fn new(field: impl Into<String>, operator: Operator, value: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            operator,
            value: value.into(),
            matcher: None,
        }
    }

    /// Attach an in-memory evaluator to this leaf.
    pub fn with_matcher(mut self, matcher: Arc<dyn Matchable<E>>) -> Self {
        self.matcher = Some(matcher);
        self
    }

    pub fn field(&self) -> &str {
        &self.field
    }

    pub fn operator(&self) -> Operator {
        self.operator
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    pub fn matcher(&self) -> Option<&dyn Matchable<E>> {
        self.matcher.as_deref()
    }
}

impl<E> Clone for OperatorPredicate<E> {
    fn clone(&self) -> Self {
        Self {
            field: self.field.clone(),
            operator: self.operator,
            value: self.value.clone(),
            matcher: self.matcher.clone(),
        }
    }
}

/// Boolean tree of operator predicates.
pub enum Predicate<E> {
    /// Matches every document
    Any,
    Operator(OperatorPredicate<E>),
    And(Vec<Predicate<E>>),
    Or(Vec<Predicate<E>>),
    Not(Box<Predicate<E>>),
}

impl<E> Predicate<E> {
    pub fn any() -> Self {
        Predicate::Any
    }

    pub fn eq(field: impl Into<String>, value: impl Into<String>) -> Self {
        Predicate::Operator(OperatorPredicate::new(field, Operator::Equals, value))
    }

    pub fn prefix(field: impl Into<String>, value: impl Into<String>) -> Self {
        Predicate::Operator(OperatorPredicate::new(field, Operator::Prefix, value))
    }

    pub fn contains(field: impl Into<String>, value: impl Into<String>) -> Self {
        Predicate::Operator(OperatorPredicate::new(field, Operator::Contains, value))
    }

    pub fn and(children: Vec<Predicate<E>>) -> Self {
        Predicate::And(children)
    }

    pub fn or(children: Vec<Predicate<E>>) -> Self {
        Predicate::Or(children)
    }

    pub fn not(child: Predicate<E>) -> Self {
        Predicate::Not(Box::new(child))
    }

    /// Direct children of a composite predicate (empty for leaves).
    pub fn children(&self) -> &[Predicate<E>] {
        match self {
            Predicate::And(children) | Predicate::Or(children) => children,
            Predicate::Not(child) => std::slice::from_ref(child.as_ref()),
            Predicate::Any | Predicate::Operator(_) => &[],
        }
    }

    /// The leaf's in-memory evaluator, if this is a matchable leaf.
    pub fn as_matchable(&self) -> Option<&dyn Matchable<E>> {
        match self {
            Predicate::Operator(leaf) => leaf.matcher(),
            _ => None,
        }
    }

    /// Whether the whole tree can be evaluated in memory.
    pub fn is_matchable(&self) -> bool {
        match self {
            Predicate::Any => true,
            Predicate::Operator(leaf) => leaf.matcher().is_some(),
            _ => self.children().iter().all(Predicate::is_matchable),
        }
    }

    /// Evaluate the tree against an entity.
    ///
    /// Returns None if any leaf lacks an evaluator. Children of AND/OR are
    /// tried cheapest first.
    pub fn matches(&self, entity: &E) -> Option<bool> {
        if !self.is_matchable() {
            return None;
        }
        Some(self.eval(entity))
    }

    fn eval(&self, entity: &E) -> bool {
        match self {
            Predicate::Any => true,
            Predicate::Operator(leaf) => leaf.matcher().is_some_and(|m| m.matches(entity)),
            Predicate::And(children) => by_cost(children).all(|p| p.eval(entity)),
            Predicate::Or(children) => by_cost(children).any(|p| p.eval(entity)),
            Predicate::Not(child) => !child.eval(entity),
        }
    }

    /// Estimated evaluation cost; leaves without an evaluator count as 1.
    pub fn cost(&self) -> u32 {
        match self {
            Predicate::Any => 0,
            Predicate::Operator(leaf) => leaf.matcher().map(|m| m.cost()).unwrap_or(1),
            _ => self
                .children()
                .iter()
                .map(Predicate::cost)
                .fold(0u32, u32::saturating_add),
        }
    }
}

fn by_cost<E>(children: &[Predicate<E>]) -> impl Iterator<Item = &Predicate<E>> {
    let mut ordered: Vec<&Predicate<E>> = children.iter().collect();
    ordered.sort_by_key(|p| p.cost());
    ordered.into_iter()
}

impl<E> Clone for Predicate<E> {
    fn clone(&self) -> Self {
        match self {
            Predicate::Any => Predicate::Any,
            Predicate::Operator(leaf) => Predicate::Operator(leaf.clone()),
            Predicate::And(children) => Predicate::And(children.clone()),
            Predicate::Or(children) => Predicate::Or(children.clone()),
            Predicate::Not(child) => Predicate::Not(child.clone()),
        }
    }
}

impl<E> fmt::Display for Predicate<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Predicate::Any => f.write_str("*"),
            Predicate::Operator(leaf) => match leaf.operator {
                Operator::Equals => write!(f, "{}:{}", leaf.field, leaf.value),
                op => write!(f, "{}:{}({})", leaf.field, op, leaf.value),
            },
            Predicate::And(children) | Predicate::Or(children) => {
                let name = if matches!(self, Predicate::And(_)) { "AND" } else { "OR" };
                write!(f, "{}(", name)?;
                for (i, child) in children.iter().enumerate() {
                    if i > 0 {
                        f.write_str(",")?;
                    }
                    write!(f, "{}", child)?;
                }
                f.write_str(")")
            }
            Predicate::Not(child) => write!(f, "-{}", child),
        }
    }
}

impl<E> fmt::Debug for Predicate<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Predicate({})", self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};

    struct LengthAtLeast {
        min: usize,
        cost: u32,
        ran: AtomicBool,
    }

    impl LengthAtLeast {
        fn new(min: usize, cost: u32) -> Arc<Self> {
            Arc::new(Self {
                min,
                cost,
                ran: AtomicBool::new(false),
            })
        }
    }

    impl Matchable<String> for LengthAtLeast {
        fn matches(&self, entity: &String) -> bool {
            self.ran.store(true, Ordering::SeqCst);
            entity.len() >= self.min
        }

        fn cost(&self) -> u32 {
            self.cost
        }
    }

    fn matchable(min: usize, cost: u32) -> (Predicate<String>, Arc<LengthAtLeast>) {
        let matcher = LengthAtLeast::new(min, cost);
        let leaf = OperatorPredicate::new("len", Operator::Equals, min.to_string())
            .with_matcher(matcher.clone());
        (Predicate::Operator(leaf), matcher)
    }

    #[test]
    fn test_plain_leaf_is_not_matchable() {
        let p: Predicate<String> = Predicate::eq("name", "foo");
        assert!(p.as_matchable().is_none());
        assert!(!p.is_matchable());
        assert_eq!(p.matches(&"foo".to_string()), None);
        assert_eq!(p.cost(), 1);
    }

    #[test]
    fn test_matchable_leaf() {
        let (p, matcher) = matchable(3, 5);
        assert!(p.as_matchable().is_some());
        assert_eq!(p.cost(), 5);
        assert_eq!(p.matches(&"abcd".to_string()), Some(true));
        assert!(matcher.ran.load(Ordering::SeqCst));
        assert_eq!(p.matches(&"ab".to_string()), Some(false));
    }

    #[test]
    fn test_composite_evaluation() {
        let (short, _) = matchable(2, 1);
        let (long, _) = matchable(10, 1);

        let and = Predicate::and(vec![short.clone(), long.clone()]);
        let or = Predicate::or(vec![short.clone(), long.clone()]);
        let not = Predicate::not(long);

        let entity = "hello".to_string();
        assert_eq!(and.matches(&entity), Some(false));
        assert_eq!(or.matches(&entity), Some(true));
        assert_eq!(not.matches(&entity), Some(true));
        assert_eq!(and.cost(), 2);
    }

    #[test]
    fn test_and_short_circuits_on_cheapest() {
        let (cheap, cheap_matcher) = matchable(100, 1);
        let (costly, costly_matcher) = matchable(1, 50);
        let and = Predicate::and(vec![costly, cheap]);

        assert_eq!(and.matches(&"x".to_string()), Some(false));
        assert!(cheap_matcher.ran.load(Ordering::SeqCst));
        assert!(!costly_matcher.ran.load(Ordering::SeqCst));
    }

    #[test]
    fn test_mixed_tree_is_not_matchable() {
        let (m, _) = matchable(1, 1);
        let p = Predicate::and(vec![m, Predicate::eq("name", "foo")]);
        assert!(!p.is_matchable());
        assert_eq!(p.matches(&"foo".to_string()), None);
    }

    #[test]
    fn test_display() {
        let p: Predicate<String> = Predicate::and(vec![
            Predicate::eq("name", "admins"),
            Predicate::not(Predicate::prefix("inname", "test")),
            Predicate::or(vec![Predicate::contains("description", "ci bots"), Predicate::any()]),
        ]);
        assert_eq!(
            p.to_string(),
            "AND(name:admins,-inname:prefix(test),OR(description:contains(ci bots),*))"
        );
    }

    #[test]
    fn test_children() {
        let p: Predicate<String> =
            Predicate::or(vec![Predicate::eq("a", "1"), Predicate::eq("b", "2")]);
        assert_eq!(p.children().len(), 2);
        assert_eq!(Predicate::not(p).children().len(), 1);
        assert!(Predicate::<String>::any().children().is_empty());
    }
}
