use lazy_static::lazy_static;
pub use vigil_metrics::*;

lazy_static! {
    pub static ref ENDPOINT_REQUESTS: Result<IntCounterVec> = try_create_int_counter_vec(
        "vigil_endpoint_requests_total",
        "The number of requests made to each provider endpoint",
        &["endpoint"]
    );
    pub static ref ENDPOINT_ERRORS: Result<IntCounterVec> = try_create_int_counter_vec(
        "vigil_endpoint_errors_total",
        "The number of failed requests per provider endpoint",
        &["endpoint"]
    );
    pub static ref DUTY_LATENCY: Result<HistogramVec> = try_create_histogram_vec(
        "vigil_duty_seconds",
        "Wall-clock duration of each duty, from trigger to submission",
        &["duty"]
    );
    pub static ref DUTIES_COMPLETED: Result<IntCounterVec> = try_create_int_counter_vec(
        "vigil_duties_completed_total",
        "Duties finished, by kind and outcome",
        &["duty", "outcome"]
    );
    pub static ref INVARIANT_VIOLATIONS: Result<IntCounterVec> = try_create_int_counter_vec(
        "vigil_invariant_violations_total",
        "Duty inputs rejected for violating chain-time invariants",
        &["duty"]
    );
    pub static ref SCHEDULER_JOBS: Result<IntCounterVec> = try_create_int_counter_vec(
        "vigil_scheduler_jobs_total",
        "Scheduled jobs by terminal state",
        &["state"]
    );
    pub static ref PROPOSAL_CANDIDATES: Result<IntCounterVec> = try_create_int_counter_vec(
        "vigil_proposal_candidates_total",
        "Block proposal candidates obtained, by provenance",
        &["provenance"]
    );
    pub static ref PROPOSAL_SCORE: Result<Histogram> = try_create_histogram(
        "vigil_proposal_score",
        "Attestation score of the selected block proposal"
    );
    pub static ref SIGNER_REFUSALS: Result<IntCounter> = try_create_int_counter(
        "vigil_signer_refusals_total",
        "Signing requests declined by the signer"
    );
}
