//! Core Specification trait and combinators.

use std::sync::Arc;

use crate::context::{CharacterSnapshot, UserSnapshot};

/// A composable predicate over an evaluation context.
///
/// Evaluation is pure: a specification only reads the context it is handed.
pub trait Specification<Ctx>: Send + Sync {
    /// Check if the specification is satisfied by the given context.
    fn is_satisfied_by(&self, ctx: &Ctx) -> bool;
}

/// A boxed specification for dynamic dispatch.
pub type BoxedSpec<Ctx> = Arc<dyn Specification<Ctx>>;

impl<Ctx> Specification<Ctx> for BoxedSpec<Ctx> {
    fn is_satisfied_by(&self, ctx: &Ctx) -> bool {
        self.as_ref().is_satisfied_by(ctx)
    }
}

/// All specifications in the collection must be satisfied. Empty is `true`.
pub struct AllOf<Ctx> {
    specs: Vec<BoxedSpec<Ctx>>,
}

impl<Ctx> AllOf<Ctx> {
    pub fn new(specs: Vec<BoxedSpec<Ctx>>) -> Self {
        AllOf { specs }
    }
}

impl<Ctx> Specification<Ctx> for AllOf<Ctx> {
    fn is_satisfied_by(&self, ctx: &Ctx) -> bool {
        self.specs.iter().all(|spec| spec.is_satisfied_by(ctx))
    }
}

/// Any specification in the collection must be satisfied. Empty is `false`.
pub struct AnyOf<Ctx> {
    specs: Vec<BoxedSpec<Ctx>>,
}

impl<Ctx> AnyOf<Ctx> {
    pub fn new(specs: Vec<BoxedSpec<Ctx>>) -> Self {
        AnyOf { specs }
    }
}

impl<Ctx> Specification<Ctx> for AnyOf<Ctx> {
    fn is_satisfied_by(&self, ctx: &Ctx) -> bool {
        self.specs.iter().any(|spec| spec.is_satisfied_by(ctx))
    }
}

/// Lifts a character specification to users: satisfied when at least one linked
/// character satisfies it.
pub struct AnyCharacter(pub BoxedSpec<CharacterSnapshot>);

impl Specification<UserSnapshot> for AnyCharacter {
    fn is_satisfied_by(&self, user: &UserSnapshot) -> bool {
        user.characters.iter().any(|c| self.0.is_satisfied_by(c))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Fixed(bool);

    impl Specification<i32> for Fixed {
        fn is_satisfied_by(&self, _ctx: &i32) -> bool {
            self.0
        }
    }

    struct Counting {
        result: bool,
        calls: Arc<AtomicUsize>,
    }

    impl Specification<i32> for Counting {
        fn is_satisfied_by(&self, _ctx: &i32) -> bool {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.result
        }
    }

    fn fixed(result: bool) -> BoxedSpec<i32> {
        Arc::new(Fixed(result))
    }

    #[test]
    fn test_empty_combinators() {
        assert!(AllOf::<i32>::new(vec![]).is_satisfied_by(&0));
        assert!(!AnyOf::<i32>::new(vec![]).is_satisfied_by(&0));
    }

    #[test]
    fn test_single_child_is_identity() {
        for result in [true, false] {
            assert_eq!(AllOf::new(vec![fixed(result)]).is_satisfied_by(&0), result);
            assert_eq!(AnyOf::new(vec![fixed(result)]).is_satisfied_by(&0), result);
        }
    }

    #[test]
    fn test_short_circuit_left_to_right() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counting: BoxedSpec<i32> = Arc::new(Counting {
            result: true,
            calls: calls.clone(),
        });

        assert!(!AllOf::new(vec![fixed(false), counting.clone()]).is_satisfied_by(&0));
        assert!(AnyOf::new(vec![fixed(true), counting.clone()]).is_satisfied_by(&0));
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        assert!(AllOf::new(vec![fixed(true), counting]).is_satisfied_by(&0));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_any_character() {
        struct NamedBob;
        impl Specification<CharacterSnapshot> for NamedBob {
            fn is_satisfied_by(&self, c: &CharacterSnapshot) -> bool {
                c.name == "Bob"
            }
        }

        let spec = AnyCharacter(Arc::new(NamedBob));
        let user = UserSnapshot::new(1, "u")
            .with_character(CharacterSnapshot::new(1, "Alice"))
            .with_character(CharacterSnapshot::new(2, "Bob"));

        assert!(spec.is_satisfied_by(&user));
        assert!(!spec.is_satisfied_by(&UserSnapshot::new(2, "empty")));
    }
}
