//! Registered constructors, directive consumption, and post-build actions.

use eyre::Result;
use facet::Facet;
use facet_fixture::{
    BuildError, Factory, FixtureSet, RegistryBuilder, RegistryError,
};

fn setup() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

// Deliberately not Default: only a registered constructor can build one.
#[derive(Facet, Debug, PartialEq, Clone)]
#[facet(auto_traits)]
struct Account {
    id: u64,
    plan: String,
}

#[derive(Facet, Debug, PartialEq, Clone)]
#[facet(auto_traits)]
struct Profile {
    display: String,
}

#[derive(Facet, Debug, PartialEq, Clone)]
#[facet(auto_traits)]
struct User {
    name: String,
    profile: Profile,
}

#[derive(Facet, Default, Debug, PartialEq, Clone)]
#[facet(auto_traits)]
struct Stats {
    count: u32,
    summary: String,
}

#[test]
fn types_without_default_need_a_constructor() {
    setup();
    let factory = Factory::new(RegistryBuilder::new().finish());
    let err = factory.create::<Account>().build().unwrap_err();
    match err {
        BuildError::MissingDefaultConstructor { shape } => assert_eq!(shape, Account::SHAPE),
        other => panic!("expected MissingDefaultConstructor, got {other:?}"),
    }
}

#[test]
fn constructors_consume_the_directives_they_take() -> Result<()> {
    setup();
    let mut registry = RegistryBuilder::new();
    registry.constructor::<Account, _>(|sources| {
        Ok(Account {
            // Scaled so a later re-assignment of the raw directive would be
            // visible.
            id: sources.take_or("id", 7u64)? * 10,
            plan: sources.take("plan")?,
        })
    })?;
    let factory = Factory::new(registry.finish());

    let account: Account = factory.create().with("id", 42u64)?.build()?;
    assert_eq!(account.id, 420, "the assignment pass must skip consumed directives");
    assert_eq!(account.plan, "", "absent directives fall back to the default");

    let account: Account = factory.create().build()?;
    assert_eq!(account.id, 70, "absent take_or directives fall back to the fallback");
    Ok(())
}

#[test]
fn unconsumed_directives_are_still_assigned() -> Result<()> {
    setup();
    let mut registry = RegistryBuilder::new();
    registry.constructor::<Account, _>(|sources| {
        Ok(Account {
            id: sources.take_or("id", 1u64)?,
            plan: "basic".to_string(),
        })
    })?;
    let factory = Factory::new(registry.finish());

    let account: Account = factory
        .create()
        .with("plan", "premium".to_string())?
        .build()?;
    assert_eq!(account.plan, "premium");
    Ok(())
}

#[test]
fn take_or_build_runs_the_nested_engine() -> Result<()> {
    setup();
    let mut registry = RegistryBuilder::new();
    registry.constructor::<Profile, _>(|_| {
        Ok(Profile {
            display: "anon".to_string(),
        })
    })?;
    registry.constructor::<User, _>(|sources| {
        Ok(User {
            name: sources.take("name")?,
            profile: sources.take_or_build("profile")?,
        })
    })?;
    let factory = Factory::new(registry.finish());

    let user: User = factory.create().with("name", "Ada".to_string())?.build()?;
    assert_eq!(user.name, "Ada");
    assert_eq!(user.profile.display, "anon");

    let user: User = factory
        .create()
        .with(
            "profile",
            Profile {
                display: "explicit".to_string(),
            },
        )?
        .build()?;
    assert_eq!(user.profile.display, "explicit");
    Ok(())
}

#[test]
fn take_or_build_with_runs_a_configured_fallback_builder() -> Result<()> {
    setup();
    let mut registry = RegistryBuilder::new();
    registry.constructor::<Profile, _>(|sources| {
        Ok(Profile {
            display: sources.take_or("display", "anon".to_string())?,
        })
    })?;
    registry.constructor::<User, _>(|sources| {
        Ok(User {
            name: sources.take_or("name", "Ada".to_string())?,
            profile: sources.take_or_build_with("profile", |profile| {
                profile.with("display", "configured".to_string())
            })?,
        })
    })?;
    let factory = Factory::new(registry.finish());

    // The fallback builder's own directive reaches the nested build.
    let user: User = factory.create().build()?;
    assert_eq!(user.profile.display, "configured");

    // An explicit directive wins; the fallback builder never runs.
    let user: User = factory
        .create()
        .with(
            "profile",
            Profile {
                display: "explicit".to_string(),
            },
        )?
        .build()?;
    assert_eq!(user.profile.display, "explicit");
    Ok(())
}

#[test]
fn post_build_actions_run_after_the_assignment_pass() -> Result<()> {
    setup();
    let mut registry = RegistryBuilder::new();
    registry.post_build::<Stats, _>(|stats| {
        stats.summary = format!("{} items", stats.count);
    })?;
    let factory = Factory::new(registry.finish());

    let stats: Stats = factory.create().with("count", 3u32)?.build()?;
    assert_eq!(stats.summary, "3 items");
    Ok(())
}

#[test]
fn conflicting_fixture_sets_fail_at_load_time() {
    setup();
    struct AccountSet;
    impl FixtureSet for AccountSet {
        fn load(&self, registry: &mut RegistryBuilder) -> Result<(), RegistryError> {
            registry.constructor::<Account, _>(|_| {
                Ok(Account {
                    id: 1,
                    plan: "basic".to_string(),
                })
            })?;
            Ok(())
        }
    }

    let mut registry = RegistryBuilder::new();
    registry.load(&AccountSet).unwrap();
    let err = registry.load(&AccountSet).unwrap_err();
    match err {
        RegistryError::DuplicateConstructor { shape } => assert_eq!(shape, Account::SHAPE),
        other => panic!("expected DuplicateConstructor, got {other:?}"),
    }
}

#[test]
fn constructor_failures_abort_the_build() {
    setup();
    let mut registry = RegistryBuilder::new();
    registry
        .constructor::<Account, _>(|sources| {
            Ok(Account {
                // `plan` is a String property; taking it as u64 is a shape
                // mismatch.
                id: sources.take::<u64>("plan")?,
                plan: String::new(),
            })
        })
        .unwrap();
    let factory = Factory::new(registry.finish());
    let err = factory
        .create::<Account>()
        .with("plan", "premium".to_string())
        .unwrap()
        .build()
        .unwrap_err();
    assert!(matches!(err, BuildError::ShapeMismatch { .. }));
}
