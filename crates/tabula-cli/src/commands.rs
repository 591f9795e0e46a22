use anyhow::Context;
use clap::ArgMatches;
use tabula_access::{explain_access, list_accessible_datasets, list_owned_datasets, resolve_identity, DatasetAccessRecord};
use tabula_core::{
    FileSessionStore, ProfileCode, Session, TabulaConfig, UnassignedPolicy, UserIdentity,
};
use tabula_gateway::ProxyClient;

pub(crate) fn session(config: &TabulaConfig) -> Session<FileSessionStore> {
    Session::new(
        FileSessionStore::new(config.session.path.clone()),
        config.session.ttl(),
    )
}

/// User of the persisted, unexpired session
pub(crate) fn current_user(config: &TabulaConfig) -> anyhow::Result<UserIdentity> {
    let mut session = session(config);
    let context = session
        .restore(chrono::Utc::now())?
        .context("not logged in; run `tabula login --email <EMAIL>` first")?;
    Ok(context.user.clone())
}

pub(crate) fn access(config: &TabulaConfig, args: &ArgMatches) -> anyhow::Result<()> {
    let code = |name: &str| ProfileCode::from_optional(args.get_one::<String>(name).map(String::as_str));
    let email = args.get_one::<String>("email").map_or("", String::as_str);
    let owner = args.get_one::<String>("owner").map_or("", String::as_str);
    let policy = args
        .get_one::<UnassignedPolicy>("policy")
        .copied()
        .unwrap_or(config.access.unassigned_policy);

    let user = UserIdentity::new(email, code("user"));
    let dataset = DatasetAccessRecord::new("cli", owner, code("dataset"));
    let decision = explain_access(&user, &dataset, policy);

    let verdict = if decision.is_granted() { "granted" } else { "denied" };
    println!("{verdict} ({decision})");
    Ok(())
}

pub(crate) async fn login(config: &TabulaConfig, args: &ArgMatches) -> anyhow::Result<()> {
    let email = args
        .get_one::<String>("email")
        .map(|e| e.trim().to_string())
        .filter(|e| !e.is_empty())
        .context("--email must not be empty")?;

    let proxy = ProxyClient::new(&config.gateway)?;
    let user = resolve_identity(&proxy, &email).await?;

    let mut session = session(config);
    let context = session.login(user, chrono::Utc::now())?;
    match &context.user.profile {
        Some(profile) => println!("Logged in as {} (profile {profile})", context.user.email),
        None => println!("Logged in as {} (no profile assigned)", context.user.email),
    }
    Ok(())
}

pub(crate) fn logout(config: &TabulaConfig) -> anyhow::Result<()> {
    session(config).logout()?;
    println!("Logged out");
    Ok(())
}

pub(crate) fn whoami(config: &TabulaConfig) -> anyhow::Result<()> {
    let mut session = session(config);
    match session.restore(chrono::Utc::now())? {
        Some(context) => {
            let profile = context
                .user
                .profile
                .as_ref()
                .map_or_else(|| "-".to_string(), ToString::to_string);
            println!("{}  profile={profile}  expires={}", context.user.email, context.expires_at);
        }
        None => println!("Not logged in"),
    }
    Ok(())
}

pub(crate) async fn datasets(config: &TabulaConfig, args: &ArgMatches) -> anyhow::Result<()> {
    let user = current_user(config)?;
    let proxy = ProxyClient::new(&config.gateway)?;

    let datasets = if args.get_flag("owned") {
        list_owned_datasets(&proxy, &user.email).await?
    } else {
        list_accessible_datasets(&proxy, &user, config.access.unassigned_policy).await?
    };

    if datasets.is_empty() {
        println!("No datasets available");
    }
    for dataset in &datasets {
        let rows = dataset
            .row_count
            .map_or_else(String::new, |n| format!("  {n} rows"));
        println!("{}  {}  ({}){rows}", dataset.id, dataset.name, dataset.owner_email);
    }
    Ok(())
}
