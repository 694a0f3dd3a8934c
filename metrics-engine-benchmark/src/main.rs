use getopts::Options;
use hdrhistogram::Histogram as HdrHistogram;
use log::{error, info};
use metrics_engine::{
    EnvironmentInfo, MetricGroup, MetricsContext, SamplingPolicy, DEFAULT_QUANTILES,
};
use quanta::Clock;
use std::{
    env,
    error::Error,
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        Arc,
    },
    thread,
    time::{Duration, Instant},
};

const LOOP_SAMPLE: u64 = 1000;

type BoxError = Box<dyn Error + Send + Sync>;

struct Generator {
    group: Arc<MetricGroup>,
    hist: HdrHistogram<u64>,
    done: Arc<AtomicBool>,
    rate_counter: Arc<AtomicU64>,
}

impl Generator {
    fn new(
        group: Arc<MetricGroup>,
        done: Arc<AtomicBool>,
        rate_counter: Arc<AtomicU64>,
    ) -> Result<Generator, BoxError> {
        Ok(Generator {
            group,
            hist: HdrHistogram::<u64>::new_with_bounds(1, u64::MAX, 3)?,
            done,
            rate_counter,
        })
    }

    /// Looks every metric up by name on each iteration.
    fn run_slow(&mut self) -> Result<(), BoxError> {
        let clock = Clock::new();
        let mut loop_counter = 0;
        let mut t0 = clock.now();

        loop {
            loop_counter += 1;

            let t1 = clock.now();
            let start = if loop_counter % LOOP_SAMPLE == 0 { Some(clock.now()) } else { None };

            self.group.counter("ok")?.increment(1);
            self.group.histogram("batch_size")?.update(loop_counter as i64 % 128);
            self.group.timer("loop")?.record_between(t0, t1)?;

            if let Some(val) = start {
                let delta = clock.now().duration_since(val);
                self.hist.saturating_record(delta.as_nanos() as u64);

                // We also increment our global counter for the sample rate here.
                self.rate_counter.fetch_add(LOOP_SAMPLE * 3, Ordering::AcqRel);

                if self.done.load(Ordering::Relaxed) {
                    return Ok(());
                }
            }

            t0 = t1;
        }
    }

    /// Resolves every metric once, up front.
    fn run_fast(&mut self) -> Result<(), BoxError> {
        let clock = Clock::new();
        let mut loop_counter = 0;
        let mut t0 = clock.now();

        let counter = self.group.counter("ok")?;
        let histogram = self.group.histogram("batch_size")?;
        let timer = self.group.timer("loop")?;

        loop {
            loop_counter += 1;

            let t1 = clock.now();
            let start = if loop_counter % LOOP_SAMPLE == 0 { Some(clock.now()) } else { None };

            counter.increment(1);
            histogram.update(loop_counter as i64 % 128);
            timer.record_between(t0, t1)?;

            if let Some(val) = start {
                let delta = clock.now().duration_since(val);
                self.hist.saturating_record(delta.as_nanos() as u64);

                // We also increment our global counter for the sample rate here.
                self.rate_counter.fetch_add(LOOP_SAMPLE * 3, Ordering::AcqRel);

                if self.done.load(Ordering::Relaxed) {
                    return Ok(());
                }
            }

            t0 = t1;
        }
    }
}

impl Drop for Generator {
    fn drop(&mut self) {
        info!(
            "    sender latency: min: {:8} p50: {:8} p95: {:8} p99: {:8} p999: {:8} max: {:8}",
            nanos_to_readable(self.hist.min()),
            nanos_to_readable(self.hist.value_at_percentile(50.0)),
            nanos_to_readable(self.hist.value_at_percentile(95.0)),
            nanos_to_readable(self.hist.value_at_percentile(99.0)),
            nanos_to_readable(self.hist.value_at_percentile(99.9)),
            nanos_to_readable(self.hist.max())
        );
    }
}

fn print_usage(program: &str, opts: &Options) {
    let brief = format!("Usage: {} [options]", program);
    print!("{}", opts.usage(&brief));
}

pub fn opts() -> Options {
    let mut opts = Options::new();

    opts.optopt("d", "duration", "number of seconds to run the benchmark", "INTEGER");
    opts.optopt(
        "m",
        "mode",
        "whether to run the benchmark in slow or fast mode (lookup by name vs cached handles)",
        "STRING",
    );
    opts.optopt("p", "producers", "number of producers", "INTEGER");
    opts.optopt(
        "s",
        "sampling",
        "reservoir used by histograms and timers (uniform or decaying)",
        "STRING",
    );
    opts.optflag("h", "help", "print this help menu");

    opts
}

fn main() {
    pretty_env_logger::init();

    if let Err(e) = run() {
        error!("Benchmark failed: {}", e);
    }
}

fn run() -> Result<(), BoxError> {
    let args: Vec<String> = env::args().collect();
    let program = args.first().map(String::as_str).unwrap_or("metrics-engine-benchmark");
    let opts = opts();

    let matches = match opts.parse(args.iter().skip(1)) {
        Ok(m) => m,
        Err(f) => {
            error!("Failed to parse command line args: {}", f);
            return Ok(());
        }
    };

    if matches.opt_present("help") {
        print_usage(program, &opts);
        return Ok(());
    }

    info!("metrics engine benchmark");

    let seconds: u64 = matches.opt_str("duration").unwrap_or_else(|| "60".to_owned()).parse()?;
    let producers: usize = matches.opt_str("producers").unwrap_or_else(|| "1".to_owned()).parse()?;
    let mode = matches
        .opt_str("mode")
        .map(|s| if s.to_ascii_lowercase() == "fast" { "fast" } else { "slow" })
        .unwrap_or("slow")
        .to_owned();
    let sampling = match matches.opt_str("sampling").map(|s| s.to_ascii_lowercase()).as_deref() {
        Some("uniform") => SamplingPolicy::Uniform { size: 1028 },
        _ => SamplingPolicy::default(),
    };

    info!("duration: {}s", seconds);
    info!("producers: {}", producers);
    info!("mode: {}", mode);
    info!("sampling: {:?}", sampling);

    let ctx = MetricsContext::builder()
        .with_environment(EnvironmentInfo::from_process())
        .with_sampling(sampling)
        .with_quantiles(&DEFAULT_QUANTILES)
        .build()?;

    info!("context configured");

    // Spin up our sample producers.
    let done = Arc::new(AtomicBool::new(false));
    let rate_counter = Arc::new(AtomicU64::new(0));
    let mut handles = Vec::new();

    for _ in 0..producers {
        let mut gen = Generator::new(ctx.group("benchmark"), done.clone(), rate_counter.clone())?;
        let mode = mode.clone();
        let handle = thread::spawn(move || {
            let result = if mode == "fast" { gen.run_fast() } else { gen.run_slow() };
            if let Err(e) = result {
                error!("Producer failed: {}", e);
            }
        });

        handles.push(handle);
    }

    // Poll the context to figure out the sample rate, timing each snapshot along the way.
    let mut total = 0;
    let mut t0 = Instant::now();

    let mut snapshot_hist = HdrHistogram::<u64>::new_with_bounds(1, u64::MAX, 3)?;
    for _ in 0..seconds {
        let t1 = Instant::now();

        let start = Instant::now();
        let snapshot = ctx.snapshot();
        let end = Instant::now();
        snapshot_hist.saturating_record(duration_as_nanos(end - start) as u64);

        let turn_total = rate_counter.load(Ordering::Acquire);
        let turn_delta = turn_total - total;
        total = turn_total;
        let rate = turn_delta as f64 / (duration_as_nanos(t1 - t0) / 1_000_000_000.0);

        info!("sample ingest rate: {:.0} samples/sec ({} metrics)", rate, snapshot.len());
        t0 = t1;
        thread::sleep(Duration::new(1, 0));
    }

    info!("--------------------------------------------------------------------------------");
    info!(" ingested samples total: {}", total);
    info!(
        "   context snapshot: min: {:8} p50: {:8} p95: {:8} p99: {:8} p999: {:8} max: {:8}",
        nanos_to_readable(snapshot_hist.min()),
        nanos_to_readable(snapshot_hist.value_at_percentile(50.0)),
        nanos_to_readable(snapshot_hist.value_at_percentile(95.0)),
        nanos_to_readable(snapshot_hist.value_at_percentile(99.0)),
        nanos_to_readable(snapshot_hist.value_at_percentile(99.9)),
        nanos_to_readable(snapshot_hist.max())
    );

    if let Some(timer) = ctx.snapshot().get("benchmark", "loop").and_then(|v| v.as_timer()) {
        info!(
            "    loop iteration: count: {} p50: {:8} p99: {:8} m1 rate: {:.0}/sec",
            timer.count(),
            nanos_to_readable(timer.median().as_nanos() as u64),
            nanos_to_readable(timer.quantile(0.99).unwrap_or_default().as_nanos() as u64),
            timer.rate.one_minute_rate
        );
    }

    // Wait for the producers to finish so we can get their stats too.
    done.store(true, Ordering::SeqCst);
    for handle in handles {
        if handle.join().is_err() {
            error!("Producer thread panicked.");
        }
    }

    Ok(())
}

fn duration_as_nanos(d: Duration) -> f64 {
    (d.as_secs() as f64 * 1e9) + d.subsec_nanos() as f64
}

fn nanos_to_readable(t: u64) -> String {
    let f = t as f64;
    if f < 1_000.0 {
        format!("{}ns", f)
    } else if f < 1_000_000.0 {
        format!("{:.0}μs", f / 1_000.0)
    } else if f < 2_000_000_000.0 {
        format!("{:.2}ms", f / 1_000_000.0)
    } else {
        format!("{:.3}s", f / 1_000_000_000.0)
    }
}
