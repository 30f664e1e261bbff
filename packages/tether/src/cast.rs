//! Handle casts to user-defined trait objects.
//!
//! [`Strong::as_anchored`][crate::Strong::as_anchored] and
//! [`Strong::downcast`][crate::Strong::downcast] cover the built-in base
//! capability. The [`define_handle_cast!`] macro extends the same shape
//! to any user trait that has [`Anchored`][crate::Anchored] as a
//! supertrait.

/// Generates handle cast methods for a user-defined trait.
///
/// For a trait `Example` with [`Anchored`][crate::Anchored] as a
/// supertrait, `define_handle_cast!(Example)` generates:
///
/// * `cast_example()` on `Strong<T>` and `Weak<T>` for every `T: Example`,
///   returning a handle to the same object as `Strong<dyn Example>` or
///   `Weak<dyn Example>`.
/// * `downcast::<U>()` on `Strong<dyn Example>`, recovering a
///   concrete-type handle when the target is a `U`.
///
/// The generated methods live on extension traits named `CastExample` and
/// `DowncastExample`, defined where the macro is invoked; they are in
/// scope automatically there and can be re-exported like any other item.
///
/// Cast handles share the target's reference count: casting an owning
/// handle raises the count by one, exactly like cloning it.
///
/// The trait name must be a plain identifier that is in scope; import the
/// trait first if it lives in another module.
///
/// # Example
///
/// ```
/// use tether::{Anchor, Anchored, Strong, define_handle_cast};
///
/// pub trait Shape: Anchored {
///     fn area(&self) -> f64;
/// }
///
/// define_handle_cast!(Shape);
///
/// struct Circle {
///     anchor: Anchor,
///     radius: f64,
/// }
///
/// impl Anchored for Circle {
///     fn anchor(&self) -> &Anchor {
///         &self.anchor
///     }
/// }
///
/// impl Shape for Circle {
///     fn area(&self) -> f64 {
///         std::f64::consts::PI * self.radius * self.radius
///     }
/// }
///
/// let circle = Strong::new(Circle {
///     anchor: Anchor::new(),
///     radius: 1.0,
/// });
///
/// // Cast to the trait object while keeping shared ownership.
/// let shape: Strong<dyn Shape> = circle.cast_shape();
/// assert!(shape.area() > 3.0);
/// assert_eq!(circle.strong_count(), 2);
///
/// // And back down to the concrete type.
/// let restored = shape.downcast::<Circle>().unwrap();
/// assert_eq!(restored.radius, 1.0);
/// ```
#[macro_export]
macro_rules! define_handle_cast {
    ($trait_:ident) => {
        $crate::__private::paste! {
            #[doc = concat!(
                "Casts handles to [`", stringify!($trait_), "`] trait objects.\n\n",
                "Generated by the `define_handle_cast!` macro.",
            )]
            #[allow(
                unreachable_pub,
                reason = "macro-generated; reachability depends on the expansion site"
            )]
            pub trait [<Cast $trait_>] {
                /// The same kind of handle, with the target viewed as
                #[doc = concat!("`dyn ", stringify!($trait_), "`.")]
                type Output;

                #[doc = concat!(
                    "Returns a handle to the same object as `dyn ",
                    stringify!($trait_), "`.",
                )]
                fn [<cast_ $trait_:snake>](&self) -> Self::Output;
            }

            impl<T> [<Cast $trait_>] for $crate::Strong<T>
            where
                T: $trait_ + $crate::Anchored,
            {
                type Output = $crate::Strong<dyn $trait_>;

                fn [<cast_ $trait_:snake>](&self) -> Self::Output {
                    self.__cast_with(|value| value as &dyn $trait_)
                }
            }

            impl<T> [<Cast $trait_>] for $crate::Weak<T>
            where
                T: $trait_ + $crate::Anchored,
            {
                type Output = $crate::Weak<dyn $trait_>;

                fn [<cast_ $trait_:snake>](&self) -> Self::Output {
                    self.__map_ptr::<dyn $trait_, _>(|ptr| ptr)
                }
            }

            #[doc = concat!(
                "Downcasts [`", stringify!($trait_), "`] trait object handles ",
                "to concrete types.\n\n",
                "Generated by the `define_handle_cast!` macro.",
            )]
            #[allow(
                unreachable_pub,
                reason = "macro-generated; reachability depends on the expansion site"
            )]
            pub trait [<Downcast $trait_>] {
                /// Checked downcast of the handle to a concrete type.
                ///
                /// Returns `None` when the target's dynamic type is not
                /// `U`, leaving the reference count untouched.
                fn downcast<U>(&self) -> Option<$crate::Strong<U>>
                where
                    U: $trait_ + $crate::Anchored;
            }

            impl [<Downcast $trait_>] for $crate::Strong<dyn $trait_> {
                fn downcast<U>(&self) -> Option<$crate::Strong<U>>
                where
                    U: $trait_ + $crate::Anchored,
                {
                    self.__downcast_with(|value| value as &dyn $crate::Anchored)
                }
            }
        }
    };
}

#[cfg(test)]
mod tests {
    #![allow(
        clippy::indexing_slicing,
        clippy::arithmetic_side_effects,
        reason = "test code is permitted less rigor"
    )]

    use crate::{Anchor, Anchored, Strong, Weak};

    pub trait Named: Anchored {
        fn name(&self) -> &str;
    }

    define_handle_cast!(Named);

    struct Station {
        anchor: Anchor,
        name: String,
    }

    impl Anchored for Station {
        fn anchor(&self) -> &Anchor {
            &self.anchor
        }
    }

    impl Named for Station {
        fn name(&self) -> &str {
            &self.name
        }
    }

    struct Satellite {
        anchor: Anchor,
    }

    impl Anchored for Satellite {
        fn anchor(&self) -> &Anchor {
            &self.anchor
        }
    }

    impl Named for Satellite {
        fn name(&self) -> &str {
            "unnamed"
        }
    }

    fn station(name: &str) -> Strong<Station> {
        Strong::new(Station {
            anchor: Anchor::new(),
            name: name.to_string(),
        })
    }

    #[test]
    fn cast_strong_handle_shares_ownership() {
        let concrete = station("alpha");

        let erased: Strong<dyn Named> = concrete.cast_named();

        assert_eq!(erased.name(), "alpha");
        assert_eq!(concrete.strong_count(), 2);

        drop(concrete);

        // The erased handle alone keeps the object alive.
        assert_eq!(erased.name(), "alpha");
        assert_eq!(erased.strong_count(), 1);
    }

    #[test]
    fn cast_weak_handle_observes_the_same_target() {
        let concrete = station("beta");
        let weak: Weak<dyn Named> = concrete.downgrade().cast_named();

        let resolved = weak.upgrade().unwrap();
        assert_eq!(resolved.name(), "beta");
        drop(resolved);

        drop(concrete);
        assert!(weak.upgrade().is_none());
    }

    #[test]
    fn cast_weak_handle_works_after_target_death() {
        let concrete = station("gamma");
        let weak = concrete.downgrade();

        drop(concrete);

        // The cast maps the stored pointer without touching the object,
        // so it is fine to cast a handle whose target is long gone.
        let erased = weak.cast_named();
        assert!(erased.upgrade().is_none());
    }

    #[test]
    fn downcast_recovers_the_concrete_type() {
        let concrete = station("delta");
        let erased: Strong<dyn Named> = concrete.cast_named();

        let restored = erased.downcast::<Station>().unwrap();

        assert_eq!(restored.name, "delta");
        assert_eq!(concrete.strong_count(), 3);
    }

    #[test]
    fn downcast_to_the_wrong_type_leaves_the_count_alone() {
        let concrete = station("epsilon");
        let erased: Strong<dyn Named> = concrete.cast_named();

        assert!(erased.downcast::<Satellite>().is_none());
        assert_eq!(concrete.strong_count(), 2);
    }

    #[test]
    fn erased_handle_can_outlive_every_concrete_handle() {
        let erased: Strong<dyn Named> = station("zeta").cast_named();

        assert_eq!(erased.strong_count(), 1);
        assert_eq!(erased.name(), "zeta");
    }
}
