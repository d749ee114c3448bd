//!
//! xmail admin binary
//! ------------------
//! Maintains users and roles in the snapshot-backed identity store. Settings come
//! from `XMAIL_*` environment variables, or from a JSON file given with `--config`.

use std::collections::BTreeSet;
use std::env;
use std::sync::Arc;

use anyhow::{anyhow, bail, Result};
use tracing::info;

use xmail::config::Settings;
use xmail::identity::{identity_migrator, Argon2Service, IndexedUserDatastore, NewUser, PasswordService, User, UserDatastore, UserQuery};
use xmail::storage::MemoryDocumentStore;

const USAGE: &str = "xmail admin\n\nUSAGE:\n  xmail_admin [--config FILE] [--root DIR] <command> [args]\n\nCOMMANDS:\n  migrate                         Create identity indexes\n  add-user <username> <password>  Register a user\n  add-role <name> [perm,...]      Create a role\n  grant <username> <role>         Add a role to a user\n  revoke <username> <role>        Remove a role from a user\n  find-user <attr>=<value>...     Look a user up by identity attributes\n  deactivate <username>           Block logins\n  activate <username>             Allow logins again\n  delete-user <username>          Remove a user (roles are kept)\n\nOPTIONS:\n  --config FILE   JSON settings file (default: XMAIL_* environment)\n  --root DIR      Identity store directory (env: XMAIL_IDENTITY_ROOT, default dbs/identity)\n";

fn take_flag(args: &mut Vec<String>, flag: &str) -> Result<Option<String>> {
    let Some(i) = args.iter().position(|a| a == flag) else { return Ok(None) };
    if i + 1 >= args.len() { bail!("{} needs a value", flag); }
    let v = args.remove(i + 1);
    args.remove(i);
    Ok(Some(v))
}

fn arg<'a>(args: &'a [String], i: usize, what: &str) -> Result<&'a str> {
    args.get(i).map(|s| s.as_str()).ok_or_else(|| anyhow!("missing {}\n\n{}", what, USAGE))
}

fn require_user(users: &dyn UserDatastore, username: &str) -> Result<User> {
    users.find_user_by_username(username)?.ok_or_else(|| anyhow!("no such user '{}'", username))
}

fn print_user(user: &User) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(&user.security_payload())?);
    Ok(())
}

fn main() -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new("info"))?;
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();

    let mut args: Vec<String> = env::args().skip(1).collect();
    if args.is_empty() || args.iter().any(|a| a == "--help" || a == "-h") {
        print!("{}", USAGE);
        return Ok(());
    }
    let config = take_flag(&mut args, "--config")?;
    let root = take_flag(&mut args, "--root")?;
    let mut settings = match config {
        Some(path) => Settings::from_json_file(path)?,
        None => Settings::from_env()?,
    };
    if let Some(r) = root { settings.identity_root = r.into(); }

    let store = MemoryDocumentStore::open(&settings.identity_root)?;
    let index = settings.attribute_index();
    let report = identity_migrator(&index).run(&store)?;
    let users = IndexedUserDatastore::new(Arc::new(store.clone()), index)?;
    info!(target: "xmail::admin", "identity store at {} ({} users)", settings.identity_root.display(), store.len("user"));

    let cmd = args[0].as_str();
    match cmd {
        "migrate" => {
            println!("created={} updated={} unchanged={}", report.created.len(), report.updated.len(), report.unchanged.len());
        }
        "add-user" => {
            let username = arg(&args, 1, "username")?;
            let password = arg(&args, 2, "password")?;
            let digest = Argon2Service.hash(password)?;
            let user = users.create_user(NewUser::new(username, digest))?;
            print_user(&user)?;
        }
        "add-role" => {
            let name = arg(&args, 1, "role name")?;
            let perms: BTreeSet<String> = args.get(2)
                .map(|p| p.split(',').map(str::trim).filter(|s| !s.is_empty()).map(String::from).collect())
                .unwrap_or_default();
            let role = users.create_role(name, perms)?;
            println!("{}", serde_json::to_string_pretty(&role)?);
        }
        "grant" | "revoke" => {
            let mut user = require_user(&users, arg(&args, 1, "username")?)?;
            let role = arg(&args, 2, "role")?;
            let changed = if cmd == "grant" { users.add_role_to_user(&mut user, role)? } else { users.remove_role_from_user(&mut user, role)? };
            println!("{} {} {}: {}", cmd, role, user.username, if changed { "changed" } else { "unchanged" });
        }
        "find-user" => {
            let mut query = UserQuery::new();
            for pair in args.iter().skip(1) {
                let (k, v) = pair.split_once('=').ok_or_else(|| anyhow!("expected attr=value, got '{}'", pair))?;
                query = query.and(k, v);
            }
            match users.find_user(&query)? {
                Some(user) => print_user(&user)?,
                None => println!("no match"),
            }
        }
        "deactivate" | "activate" => {
            let mut user = require_user(&users, arg(&args, 1, "username")?)?;
            let changed = users.set_active(&mut user, cmd == "activate")?;
            println!("{} active={} ({})", user.username, user.active, if changed { "changed" } else { "unchanged" });
        }
        "delete-user" => {
            let user = require_user(&users, arg(&args, 1, "username")?)?;
            users.delete_user(&user)?;
            println!("deleted {}", user.username);
        }
        other => bail!("unknown command '{}'\n\n{}", other, USAGE),
    }

    store.save_snapshot()?;
    Ok(())
}
