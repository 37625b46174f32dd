use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{Days, NaiveDate};
use tokio_postgres::{Config, NoTls};
use ulid::Ulid;

fn base_night() -> NaiveDate {
    NaiveDate::from_ymd_opt(2099, 1, 1).expect("valid date")
}

fn night(offset: u64) -> String {
    (base_night() + Days::new(offset)).format("%Y-%m-%d").to_string()
}

async fn connect(host: &str, port: u16, db: &str) -> tokio_postgres::Client {
    let mut config = Config::new();
    config
        .host(host)
        .port(port)
        .dbname(db)
        .user("innkeep")
        .password("innkeep");

    let (client, conn) = config.connect(NoTls).await.expect("connect failed");
    tokio::spawn(async move {
        if let Err(e) = conn.await {
            eprintln!("connection error: {e}");
        }
    });
    client
}

fn fresh_tenant() -> String {
    format!("bench_{}", Ulid::new())
}

fn percentile(sorted: &[Duration], p: f64) -> Duration {
    if sorted.is_empty() {
        return Duration::ZERO;
    }
    let idx = ((sorted.len() as f64) * p / 100.0) as usize;
    sorted[idx.min(sorted.len() - 1)]
}

fn print_latency(label: &str, latencies: &mut [Duration]) {
    if latencies.is_empty() {
        println!("  {label}: no samples");
        return;
    }
    latencies.sort();
    let total: Duration = latencies.iter().sum();
    let avg = total / latencies.len() as u32;
    println!("  {label}:");
    println!(
        "    n={}, avg={:.2}ms, p50={:.2}ms, p95={:.2}ms, p99={:.2}ms, max={:.2}ms",
        latencies.len(),
        avg.as_secs_f64() * 1000.0,
        percentile(latencies, 50.0).as_secs_f64() * 1000.0,
        percentile(latencies, 95.0).as_secs_f64() * 1000.0,
        percentile(latencies, 99.0).as_secs_f64() * 1000.0,
        latencies[latencies.len() - 1].as_secs_f64() * 1000.0,
    );
}

/// One hotel, one room with `stock` units, priced for the whole bench year.
async fn seed_room(client: &tokio_postgres::Client, city: &str, stock: u32) -> Ulid {
    let hotel_id = Ulid::new();
    let room_id = Ulid::new();
    client
        .batch_execute(&format!(
            "INSERT INTO hotels VALUES ('{hotel_id}', 'Bench {hotel_id}', '{city}')"
        ))
        .await
        .unwrap();
    client
        .batch_execute(&format!(
            "INSERT INTO rooms VALUES ('{room_id}', '{hotel_id}', NULL, {stock}, 4)"
        ))
        .await
        .unwrap();
    client
        .batch_execute(&format!(
            "INSERT INTO pricing_periods VALUES ('{}', '{room_id}', '{}', '{}', 150)",
            Ulid::new(),
            night(0),
            night(364)
        ))
        .await
        .unwrap();
    room_id
}

fn booking_sql(room_id: Ulid, from: u64, nights: u64) -> String {
    format!(
        "INSERT INTO bookings VALUES ('{}', '{room_id}', '{}', '{}', 'Bench Guest', 1)",
        Ulid::new(),
        night(from),
        night(from + nights)
    )
}

async fn phase1_sequential(host: &str, port: u16) {
    let client = connect(host, port, &fresh_tenant()).await;
    let room_id = seed_room(&client, "Riyadh", 10).await;

    let n = 2000u64;
    let mut latencies = Vec::with_capacity(n as usize);
    let start = Instant::now();

    for i in 0..n {
        // 10 units per night, so spread over the year
        let t = Instant::now();
        client
            .batch_execute(&booking_sql(room_id, i % 360, 1))
            .await
            .unwrap();
        latencies.push(t.elapsed());
    }

    let elapsed = start.elapsed();
    let ops = n as f64 / elapsed.as_secs_f64();
    println!("  {n} bookings in {:.2}s = {ops:.0} ops/sec", elapsed.as_secs_f64());
    print_latency("booking latency", &mut latencies);
}

/// Many clients race for the last units of one room on the same nights.
async fn phase2_contention(host: &str, port: u16) {
    let tenant = fresh_tenant();
    let stock = 5u32;
    let setup = connect(host, port, &tenant).await;
    let room_id = seed_room(&setup, "Jeddah", stock).await;

    let n_tasks = 50;
    let committed = Arc::new(AtomicUsize::new(0));
    let start = Instant::now();
    let mut handles = Vec::new();

    for _ in 0..n_tasks {
        let host = host.to_string();
        let tenant = tenant.clone();
        let committed = committed.clone();
        handles.push(tokio::spawn(async move {
            let client = connect(&host, port, &tenant).await;
            let t = Instant::now();
            if client.batch_execute(&booking_sql(room_id, 30, 3)).await.is_ok() {
                committed.fetch_add(1, Ordering::Relaxed);
            }
            t.elapsed()
        }));
    }

    let mut latencies = Vec::new();
    for h in handles {
        latencies.push(h.await.unwrap());
    }

    let ok = committed.load(Ordering::Relaxed);
    println!(
        "  {n_tasks} racing clients, stock {stock}: {ok} committed in {:.2}s",
        start.elapsed().as_secs_f64()
    );
    if ok != stock as usize {
        println!("  !! expected exactly {stock} commits");
    }
    print_latency("contended booking latency", &mut latencies);
}

async fn phase3_read_under_load(host: &str, port: u16) {
    let tenant = fresh_tenant();
    let setup = connect(host, port, &tenant).await;
    let mut rooms = Vec::new();
    for _ in 0..20 {
        rooms.push(seed_room(&setup, "Dammam", 1000).await);
    }
    drop(setup);

    let stop = Arc::new(AtomicBool::new(false));
    let mut writer_handles = Vec::new();
    for (w, room_id) in rooms.iter().copied().enumerate().take(5) {
        let host = host.to_string();
        let tenant = tenant.clone();
        let stop = stop.clone();
        writer_handles.push(tokio::spawn(async move {
            let client = connect(&host, port, &tenant).await;
            let mut i = 0u64;
            while !stop.load(Ordering::Relaxed) {
                let _ = client
                    .batch_execute(&booking_sql(room_id, (w as u64 * 7 + i) % 360, 2))
                    .await;
                i += 1;
            }
        }));
    }

    let n_readers = 10;
    let reads_per_reader = 500;
    let mut reader_handles = Vec::new();

    for r in 0..n_readers {
        let host = host.to_string();
        let tenant = tenant.clone();
        let room_id = rooms[r % rooms.len()];
        reader_handles.push(tokio::spawn(async move {
            let client = connect(&host, port, &tenant).await;
            let mut availability = Vec::with_capacity(reads_per_reader);
            let mut search = Vec::with_capacity(reads_per_reader / 10);
            for i in 0..reads_per_reader {
                let from = (i % 300) as u64;
                let t = Instant::now();
                client
                    .batch_execute(&format!(
                        "SELECT * FROM availability WHERE room_id = '{room_id}' AND check_in = '{}' AND check_out = '{}'",
                        night(from),
                        night(from + 7)
                    ))
                    .await
                    .unwrap();
                availability.push(t.elapsed());

                if i % 10 == 0 {
                    let t = Instant::now();
                    client
                        .batch_execute(&format!(
                            "SELECT * FROM search WHERE city = 'Dammam' AND check_in = '{}' AND check_out = '{}' AND guests = 2",
                            night(from),
                            night(from + 3)
                        ))
                        .await
                        .unwrap();
                    search.push(t.elapsed());
                }
            }
            (availability, search)
        }));
    }

    let mut availability = Vec::new();
    let mut search = Vec::new();
    for h in reader_handles {
        let (a, s) = h.await.unwrap();
        availability.extend(a);
        search.extend(s);
    }

    stop.store(true, Ordering::Relaxed);
    for h in writer_handles {
        let _ = h.await;
    }

    print_latency("availability query", &mut availability);
    print_latency("city search (20 rooms)", &mut search);
}

async fn phase4_connection_storm(host: &str, port: u16) {
    let n_conns = 50;
    let ops_per_conn = 10;

    let start = Instant::now();
    let mut handles = Vec::new();
    let success = Arc::new(AtomicUsize::new(0));

    for _ in 0..n_conns {
        let host = host.to_string();
        let success = success.clone();
        handles.push(tokio::spawn(async move {
            let client = connect(&host, port, &fresh_tenant()).await;
            let room_id = seed_room(&client, "Abha", 10).await;
            for i in 0..ops_per_conn {
                client
                    .batch_execute(&booking_sql(room_id, i * 2, 2))
                    .await
                    .unwrap();
            }
            success.fetch_add(1, Ordering::Relaxed);
        }));
    }

    for h in handles {
        let _ = h.await;
    }

    let elapsed = start.elapsed();
    let ok = success.load(Ordering::Relaxed);
    println!(
        "  {n_conns} connections, {ops_per_conn} ops each: {ok}/{n_conns} succeeded in {:.2}s",
        elapsed.as_secs_f64()
    );
}

#[tokio::main]
async fn main() {
    let host = std::env::var("INNKEEP_HOST").unwrap_or_else(|_| "127.0.0.1".into());
    let port: u16 = std::env::var("INNKEEP_PORT")
        .unwrap_or_else(|_| "5433".into())
        .parse()
        .expect("invalid INNKEEP_PORT");

    println!("=== innkeep stress benchmark ===");
    println!("target: {host}:{port}\n");

    // Each phase uses its own tenant (unique dbname) to avoid interference

    println!("[phase 1] sequential booking throughput");
    phase1_sequential(&host, port).await;

    println!("\n[phase 2] contention on one room");
    phase2_contention(&host, port).await;

    println!("\n[phase 3] read latency under write load");
    phase3_read_under_load(&host, port).await;

    println!("\n[phase 4] connection storm");
    phase4_connection_storm(&host, port).await;

    println!("\n=== done ===");
}
