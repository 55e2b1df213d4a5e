use std::sync::Arc;

use anyhow::Result;

use vespa_dashboard::config::Config;
use vespa_dashboard::gateway::ProxyGateway;
use vespa_dashboard::loader::DashboardContext;
use vespa_dashboard::logging::{json_log, obj, v_num, v_str};
use vespa_dashboard::roles::{Role, RoleResolver, UNAUTHORIZED_MESSAGE};

#[tokio::main]
async fn main() -> Result<()> {
    let cfg = Config::from_env();
    json_log(
        "system",
        obj(&[
            ("event", v_str("startup")),
            ("config_hash", v_str(&cfg.config_hash())),
            ("cycle", v_num(cfg.cycle.as_u8() as f64)),
        ]),
    );

    // Missing email is fatal before any fetch.
    let Some(email) = cfg.user_email.clone() else {
        json_log("system", obj(&[("fatal", v_str("missing_user_email"))]));
        println!("No user email configured; set USER_EMAIL to load the dashboard.");
        return Ok(());
    };

    let api = Arc::new(ProxyGateway::new(&cfg)?);
    let ctx = DashboardContext::new(cfg.clone(), api.clone())?;

    let resolver = RoleResolver::new(api.as_ref());
    let mut role = resolver.resolve(&email).await?;

    if role == Role::Unauthorized {
        println!("{}", UNAUTHORIZED_MESSAGE);
        return Ok(());
    }

    // Super users pick an establishment before any data loads. With no
    // preselection the run stops at the selection list.
    if role.awaiting_establishment() {
        match cfg.establishment_id.clone() {
            Some(est) => role = role.with_establishment(est),
            None => {
                let list = ctx.establishments().await?;
                println!("Select an establishment (set ESTABLISHMENT_ID) and rerun:");
                for est in &list.establishments {
                    println!("  {}  {}", est.id, est.name);
                }
                if list.partial {
                    println!("  ... list truncated ({} total)", list.total);
                }
                return Ok(());
            }
        }
    }

    let Some(scope) = role.data_scope(cfg.cycle, Vec::new()) else {
        json_log("system", obj(&[("fatal", v_str("no_data_partition"))]));
        return Ok(());
    };

    match ctx.load_dashboard(&scope).await? {
        Some(view) => println!("{}", serde_json::to_string_pretty(&view)?),
        None => json_log("system", obj(&[("event", v_str("load_superseded"))])),
    }
    Ok(())
}
