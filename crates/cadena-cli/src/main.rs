use cadena_core::{ApprovedPayment, CircleEngine, NoopRevealChannel};
use cadena_domain::Plan;
use cadena_persistence::pg::{PgCircleStore, PgPlanCatalog, PoolProvider};
use uuid::Uuid;

type Engine = CircleEngine<PgCircleStore<PoolProvider>, PgPlanCatalog<PoolProvider>, NoopRevealChannel>;

fn usage() -> ! {
    eprintln!("uso: cadena <comando> [opciones]");
    eprintln!("  seed-plan --name <TXT> --duration <N> --price <CENTAVOS>");
    eprintln!("  join      --user <UUID> --plan <UUID>");
    eprintln!("  leave     --user <UUID> --group <UUID>");
    eprintln!("  draw      --group <UUID> --admin <UUID>");
    eprintln!("  reveal    --draw <UUID>");
    eprintln!("  advance   --group <UUID> | --all");
    eprintln!("  confirm   --user <UUID> --group <UUID> --period <TXT> --amount <CENTAVOS>");
    eprintln!("  reject    --user <UUID> --group <UUID> --period <TXT>");
    eprintln!("  deliver   --group <UUID> --cycle <N>");
    eprintln!("  status    --group <UUID> --cycle <N>");
    std::process::exit(2);
}

/// Recolecta `--clave valor` en pares; las claves desconocidas se ignoran.
fn flag(args: &[String], name: &str) -> Option<String> {
    let mut i = 0;
    while i < args.len() {
        if args[i] == name {
            return args.get(i + 1).cloned();
        }
        i += 1;
    }
    None
}

fn flag_uuid(args: &[String], name: &str) -> Option<Uuid> {
    flag(args, name).and_then(|v| Uuid::parse_str(&v).ok())
}

fn build_engine() -> Engine {
    if std::env::var("DATABASE_URL").is_err() {
        eprintln!("[cadena] requiere DATABASE_URL para operar contra el backend persistente");
        std::process::exit(4);
    }
    let pool = match cadena_persistence::build_dev_pool_from_env() {
        Ok(p) => p,
        Err(e) => {
            eprintln!("[cadena] pool error: {e}");
            std::process::exit(5);
        }
    };
    let store = PgCircleStore::from_pool(pool.clone());
    let catalog = PgPlanCatalog::from_pool(pool);
    CircleEngine::new(store, catalog, NoopRevealChannel)
}

fn main() {
    // Cargar .env si existe para obtener DATABASE_URL
    let _ = dotenvy::dotenv();
    let args: Vec<String> = std::env::args().collect();
    if args.len() < 2 {
        usage();
    }
    let rest = &args[2..];

    match args[1].as_str() {
        "seed-plan" => {
            let name = flag(rest, "--name").unwrap_or_else(|| usage());
            let duration: i32 = flag(rest, "--duration").and_then(|v| v.parse().ok()).unwrap_or_else(|| usage());
            let price: i64 = flag(rest, "--price").and_then(|v| v.parse().ok()).unwrap_or_else(|| usage());
            let plan = match Plan::new(name, duration, price) {
                Ok(p) => p,
                Err(e) => {
                    eprintln!("plan inválido: {e}");
                    std::process::exit(2);
                }
            };
            // el catálogo es externo al motor; el alta vive en el catálogo Pg
            if std::env::var("DATABASE_URL").is_err() {
                eprintln!("[cadena] requiere DATABASE_URL para operar contra el backend persistente");
                std::process::exit(4);
            }
            let pool = match cadena_persistence::build_dev_pool_from_env() {
                Ok(p) => p,
                Err(e) => {
                    eprintln!("pool error: {e}");
                    std::process::exit(5);
                }
            };
            let catalog = PgPlanCatalog::from_pool(pool);
            match catalog.save_plan(&plan) {
                Ok(()) => println!("plan {} ({} ciclos, {} cts)", plan.id(), plan.duration_cycles(), plan.price_cents()),
                Err(e) => {
                    eprintln!("error: {e}");
                    std::process::exit(5);
                }
            }
        }
        "join" => {
            let (user, plan) = match (flag_uuid(rest, "--user"), flag_uuid(rest, "--plan")) {
                (Some(u), Some(p)) => (u, p),
                _ => usage(),
            };
            match build_engine().join(user, plan) {
                Ok(result) => println!("grupo={} posicion=null", result.group_id),
                Err(e) => {
                    eprintln!("rechazado: {e}");
                    std::process::exit(4);
                }
            }
        }
        "leave" => {
            let (user, group) = match (flag_uuid(rest, "--user"), flag_uuid(rest, "--group")) {
                (Some(u), Some(g)) => (u, g),
                _ => usage(),
            };
            match build_engine().leave(user, group) {
                Ok(()) => println!("baja de {user} en {group}"),
                Err(e) => {
                    eprintln!("rechazado: {e}");
                    std::process::exit(4);
                }
            }
        }
        "draw" => {
            let (group, admin) = match (flag_uuid(rest, "--group"), flag_uuid(rest, "--admin")) {
                (Some(g), Some(a)) => (g, a),
                _ => usage(),
            };
            match build_engine().start_draw(group, admin) {
                Ok(session) => {
                    println!("sorteo={} pasos={}", session.id(), session.total_steps());
                    for a in session.final_positions() {
                        println!("  usuario={} posicion={}", a.user_id, a.position);
                    }
                }
                Err(e) => {
                    eprintln!("rechazado: {e}");
                    std::process::exit(4);
                }
            }
        }
        "reveal" => {
            let draw = flag_uuid(rest, "--draw").unwrap_or_else(|| usage());
            match build_engine().advance_reveal(draw) {
                Ok(session) => println!("sorteo={} paso={}/{} estado={}",
                                        session.id(),
                                        session.current_step(),
                                        session.total_steps(),
                                        session.status()),
                Err(e) => {
                    eprintln!("rechazado: {e}");
                    std::process::exit(4);
                }
            }
        }
        "advance" => {
            let engine = build_engine();
            if rest.iter().any(|a| a == "--all") {
                match engine.run_period() {
                    Ok(report) => {
                        for advance in &report.advanced {
                            println!("grupo={} ciclo={}->{} completado={}",
                                     advance.group_id,
                                     advance.previous_cycle,
                                     advance.new_cycle,
                                     advance.completed);
                        }
                        for (group_id, e) in &report.failures {
                            eprintln!("grupo={group_id} omitido: {e}");
                        }
                        if !report.failures.is_empty() {
                            std::process::exit(4);
                        }
                    }
                    Err(e) => {
                        eprintln!("error: {e}");
                        std::process::exit(5);
                    }
                }
            } else {
                let group = flag_uuid(rest, "--group").unwrap_or_else(|| usage());
                match engine.advance_cycle(group) {
                    Ok(advance) => println!("ciclo={}->{} completado={}",
                                            advance.previous_cycle,
                                            advance.new_cycle,
                                            advance.completed),
                    Err(e) => {
                        eprintln!("rechazado: {e}");
                        std::process::exit(4);
                    }
                }
            }
        }
        "confirm" => {
            let (user, group) = match (flag_uuid(rest, "--user"), flag_uuid(rest, "--group")) {
                (Some(u), Some(g)) => (u, g),
                _ => usage(),
            };
            let period = flag(rest, "--period").unwrap_or_else(|| usage());
            let amount: i64 = flag(rest, "--amount").and_then(|v| v.parse().ok()).unwrap_or_else(|| usage());
            let payment = ApprovedPayment { user_id: user, group_id: group, period, amount_cents: amount };
            match build_engine().confirm_payment(payment) {
                Ok(c) => println!("aporte={} estado={}", c.id(), c.status()),
                Err(e) => {
                    eprintln!("rechazado: {e}");
                    std::process::exit(4);
                }
            }
        }
        "reject" => {
            let (user, group) = match (flag_uuid(rest, "--user"), flag_uuid(rest, "--group")) {
                (Some(u), Some(g)) => (u, g),
                _ => usage(),
            };
            let period = flag(rest, "--period").unwrap_or_else(|| usage());
            match build_engine().reject_payment(user, group, &period) {
                Ok(c) => println!("aporte={} estado={}", c.id(), c.status()),
                Err(e) => {
                    eprintln!("rechazado: {e}");
                    std::process::exit(4);
                }
            }
        }
        "deliver" => {
            let group = flag_uuid(rest, "--group").unwrap_or_else(|| usage());
            let cycle: i32 = flag(rest, "--cycle").and_then(|v| v.parse().ok()).unwrap_or_else(|| usage());
            match build_engine().fulfill_delivery(group, cycle) {
                Ok(d) => println!("entrega={} estado={}", d.id(), d.status()),
                Err(e) => {
                    eprintln!("rechazado: {e}");
                    std::process::exit(4);
                }
            }
        }
        "status" => {
            let group = flag_uuid(rest, "--group").unwrap_or_else(|| usage());
            let cycle: i32 = flag(rest, "--cycle").and_then(|v| v.parse().ok()).unwrap_or_else(|| usage());
            match build_engine().period_obligations(group, cycle) {
                Ok(o) => println!("periodo={} confirmados={} pendientes={} rechazados={} cubierto={}",
                                  o.period,
                                  o.confirmed,
                                  o.pending,
                                  o.rejected,
                                  o.settled()),
                Err(e) => {
                    eprintln!("rechazado: {e}");
                    std::process::exit(4);
                }
            }
        }
        _ => usage(),
    }
}
