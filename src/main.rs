use clap::{Arg, ArgAction, Command};

use slipway::context::DeployContext;
use slipway::deploy::Deployer;
use slipway::inventory::Inventory;
use slipway::roles::RoleMap;

#[tokio::main]
async fn main() {
    let matches = Command::new("slipway")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Role-scoped SSH deploys for the transcript editor")
        .subcommand(
            Command::new("deploy")
                .about("Deploy a branch to an environment")
                .arg(Arg::new("environment").required(true))
                .arg(
                    Arg::new("branch")
                        .required(false)
                        .help("Branch to deploy (defaults to the environment name)"),
                )
                .arg(
                    Arg::new("revision")
                        .short('r')
                        .long("revision")
                        .help("Pin the checkout to a specific revision"),
                )
                .arg(
                    Arg::new("dry-run")
                        .long("dry-run")
                        .action(ArgAction::SetTrue)
                        .help("Print remote commands without running them"),
                ),
        )
        .subcommand(
            Command::new("prod")
                .about("Deploy master to production")
                .arg(
                    Arg::new("branch")
                        .required(false)
                        .help("Branch to deploy instead of master"),
                )
                .arg(
                    Arg::new("revision")
                        .short('r')
                        .long("revision")
                        .help("Pin the checkout to a specific revision"),
                )
                .arg(
                    Arg::new("dry-run")
                        .long("dry-run")
                        .action(ArgAction::SetTrue)
                        .help("Print remote commands without running them"),
                ),
        )
        .subcommand(
            Command::new("roles")
                .about("Show the resolved role map for an environment")
                .arg(Arg::new("environment").required(true))
                .arg(
                    Arg::new("json")
                        .long("json")
                        .action(ArgAction::SetTrue)
                        .help("Emit the role map as JSON"),
                ),
        )
        .subcommand(
            Command::new("servers")
                .about("Show the effective server inventory")
                .subcommand(
                    Command::new("init").about("Seed ~/.slipway/servers.toml from the builtin table"),
                ),
        )
        .get_matches();

    match matches.subcommand() {
        Some(("deploy", args)) => {
            let environment = args
                .get_one::<String>("environment")
                .expect("Environment required");
            let branch = args.get_one::<String>("branch").cloned();
            let revision = args.get_one::<String>("revision").cloned();
            run_deploy(environment, branch, revision, args.get_flag("dry-run")).await;
        }
        Some(("prod", args)) => {
            let branch = args.get_one::<String>("branch").cloned();
            let revision = args.get_one::<String>("revision").cloned();
            run_prod_deploy(branch, revision, args.get_flag("dry-run")).await;
        }
        Some(("roles", args)) => {
            let environment = args
                .get_one::<String>("environment")
                .expect("Environment required");
            show_roles(environment, args.get_flag("json"));
        }
        Some(("servers", sub_matches)) => match sub_matches.subcommand() {
            Some(("init", _)) => init_servers(),
            _ => show_servers(),
        },
        _ => println!("Use 'slipway --help'"),
    }
}

fn load_inventory() -> Inventory {
    match Inventory::load() {
        Ok(inventory) => inventory,
        Err(e) => {
            eprintln!("❌ Failed to load inventory: {}", e);
            std::process::exit(1);
        }
    }
}

async fn run_deploy(
    environment: &str,
    branch: Option<String>,
    revision: Option<String>,
    dry_run: bool,
) {
    let inventory = load_inventory();
    let mut ctx = DeployContext::new(environment, &inventory);
    ctx.revision = revision;
    ctx.dry_run = dry_run;
    finish_deploy(&mut ctx, branch).await;
}

async fn run_prod_deploy(branch: Option<String>, revision: Option<String>, dry_run: bool) {
    let inventory = load_inventory();
    let mut ctx = DeployContext::for_production(&inventory);
    ctx.revision = revision;
    ctx.dry_run = dry_run;
    finish_deploy(&mut ctx, branch).await;
}

async fn finish_deploy(ctx: &mut DeployContext, branch: Option<String>) {
    match Deployer::deploy(ctx, branch).await {
        Ok(report) => {
            if !report.hosts.is_empty() {
                println!("\n✅ Deploy complete ({} host(s))", report.hosts.len());
            }
        }
        Err(e) => {
            eprintln!("❌ Deploy failed: {}", e);
            std::process::exit(1);
        }
    }
}

fn show_roles(environment: &str, json: bool) {
    let inventory = load_inventory();
    let map = RoleMap::resolve(environment, &inventory);

    if json {
        let out = serde_json::to_string_pretty(&map).expect("Role map serializes");
        println!("{}", out);
        return;
    }

    if map.is_empty() {
        println!("No roles defined in the inventory.");
        return;
    }

    println!("🗺️  Roles in '{}':", environment);
    for (role, hosts) in map.iter() {
        if hosts.is_empty() {
            println!("   {} (no hosts)", role);
        } else {
            println!("   {}: {}", role, hosts.join(", "));
        }
    }
}

fn show_servers() {
    let inventory = load_inventory();
    println!("🖥️  Servers:");
    for server in &inventory.servers {
        println!(
            "   {}: {} [{}] roles: {}",
            server.name,
            server.host,
            server.environment,
            server.roles.join(", ")
        );
    }
}

fn init_servers() {
    let path = Inventory::config_path();
    if path.exists() {
        eprintln!("❌ {} already exists", path.display());
        std::process::exit(1);
    }
    match Inventory::builtin().save() {
        Ok(_) => println!("✅ Wrote {}", path.display()),
        Err(e) => {
            eprintln!("❌ Failed to write inventory: {}", e);
            std::process::exit(1);
        }
    }
}
