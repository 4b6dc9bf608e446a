use pubdrive_core::{Config, Paths};
use pubdrive_engine::launch::find_browser_binary;

/// Run full environment diagnostics.
pub async fn run() -> anyhow::Result<()> {
    let paths = Paths::new();

    println!();
    println!("🩺 pubdrive doctor — Environment Diagnostics");
    println!("================================");
    println!();

    let mut ok_count = 0u32;
    let mut warn_count = 0u32;
    let mut err_count = 0u32;

    // --- 1. Browser ---
    println!("🌐 Browser");
    let config = Config::load_or_default(&paths)?;
    match &config.browser_path {
        Some(path) if std::path::Path::new(path).exists() => {
            print_ok("Configured browser found", path);
            ok_count += 1;
        }
        Some(path) => {
            print_err(
                "Configured browser missing",
                &format!("{path} does not exist; fix browserPath or PUBDRIVE_CHROME_PATH"),
            );
            err_count += 1;
        }
        None => match find_browser_binary() {
            Some(binary) => {
                print_ok("Chrome/Chromium discovered", &binary);
                ok_count += 1;
            }
            None => {
                print_err(
                    "No Chrome/Chromium found",
                    "Install one or set PUBDRIVE_CHROME_PATH",
                );
                err_count += 1;
            }
        },
    }
    match config.debug_port {
        Some(port) => println!("  Debug port pinned: {}", port),
        None => println!("  Debug port: ephemeral (picked per run)"),
    }
    println!();

    // --- 2. Data directory ---
    println!("📁 Data directory");
    let base = &paths.base;
    if base.exists() {
        print_ok("Data directory exists", &base.display().to_string());
        ok_count += 1;

        let test_file = base.join(".doctor_test");
        match std::fs::write(&test_file, "test") {
            Ok(_) => {
                let _ = std::fs::remove_file(&test_file);
                print_ok("Data directory writable", "");
                ok_count += 1;
            }
            Err(e) => {
                print_err("Data directory not writable", &e.to_string());
                err_count += 1;
            }
        }
    } else {
        print_warn(
            "Data directory not created yet",
            "Will be created on first run",
        );
        warn_count += 1;
    }

    let profiles = paths.profiles_dir();
    let mut profile_count = 0usize;
    if profiles.exists() {
        if let Ok(entries) = std::fs::read_dir(&profiles) {
            profile_count = entries.flatten().filter(|e| e.path().is_dir()).count();
        }
    }
    if profile_count > 0 {
        print_ok(
            &format!("{} browser profile(s)", profile_count),
            "logins persist between runs",
        );
        ok_count += 1;
    } else {
        print_warn(
            "No browser profiles yet",
            "First run per platform will need a manual login",
        );
        warn_count += 1;
    }
    println!();

    // --- 3. Config ---
    println!("📋 Configuration");
    if paths.config_file().exists() {
        print_ok(
            "Config file exists",
            &paths.config_file().display().to_string(),
        );
        ok_count += 1;
    } else {
        print_warn("Config file not found", "Defaults in effect; this is fine");
        warn_count += 1;
    }
    println!(
        "  Timeouts: ready {}ms, call {}ms, selector {}ms, login {}ms",
        config.ready_timeout_ms,
        config.call_timeout_ms,
        config.selector_timeout_ms,
        config.login_timeout_ms
    );
    println!();

    // --- Summary ---
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!(
        "  ✅ {} passed  ⚠️  {} warnings  ❌ {} errors",
        ok_count, warn_count, err_count
    );

    if err_count > 0 {
        println!();
        println!("  {} error(s) must be fixed before normal use.", err_count);
    } else if warn_count > 0 {
        println!();
        println!("  Core features OK. Some optional features not ready.");
    } else {
        println!();
        println!("  🎉 All good!");
    }
    println!();

    Ok(())
}

fn print_ok(label: &str, detail: &str) {
    if detail.is_empty() {
        println!("  ✅ {}", label);
    } else {
        println!("  ✅ {} — {}", label, detail);
    }
}

fn print_warn(label: &str, hint: &str) {
    if hint.is_empty() {
        println!("  ⚠️  {}", label);
    } else {
        println!("  ⚠️  {} — {}", label, hint);
    }
}

fn print_err(label: &str, hint: &str) {
    if hint.is_empty() {
        println!("  ❌ {}", label);
    } else {
        println!("  ❌ {} — {}", label, hint);
    }
}
