// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

/// Field manager name used for server-side apply
pub const FIELD_MANAGER: &str = "airlift";

/// Placeholder tokens substituted in manifest templates and Helm values
pub mod placeholders {
    pub const PRIVATE_REGISTRY_URL: &str = "${PRIVATE_REGISTRY_URL}";
    pub const KNATIVE_VERSION: &str = "${KNATIVE_VERSION}";
    pub const ENVOY_VERSION: &str = "${ENVOY_VERSION}";
}

/// Environment variables that override the config file
pub mod env {
    pub const CONFIG: &str = "AIRLIFT_CONFIG";
    pub const PRIVATE_REGISTRY_URL: &str = "PRIVATE_REGISTRY_URL";
    pub const CONTAINER_ENGINE: &str = "CONTAINER_ENGINE";
    pub const REGISTRY_USERNAME: &str = "REGISTRY_USERNAME";
    pub const REGISTRY_PASSWORD: &str = "REGISTRY_PASSWORD";
    pub const KNATIVE_VERSION_FILE: &str = "KNATIVE_VERSION_FILE";
}

/// Annotation keys
pub mod annotations {
    /// Bumped on a pod template to make its controller roll the pods
    pub const RESTARTED_AT: &str = "kubectl.kubernetes.io/restartedAt";
}

/// Labels the Job controller stamps on generated Jobs. They must be removed
/// before a Job spec can be submitted again.
pub const GENERATED_JOB_LABELS: &[&str] = &[
    "controller-uid",
    "batch.kubernetes.io/controller-uid",
    "job-name",
    "batch.kubernetes.io/job-name",
];

/// Env var the Knative storage-version-migration Job needs to find its namespace
pub const SYSTEM_NAMESPACE_ENV: &str = "SYSTEM_NAMESPACE";

/// Waiting reasons that will never resolve on their own
pub const FATAL_WAITING_REASONS: &[&str] = &["InvalidImageName", "ErrImageNeverPull"];

/// Default polling configuration
pub mod polling {
    pub const TIMEOUT_SECS: u64 = 300;
    pub const INTERVAL_SECS: u64 = 10;
    /// Attempts for a service-account patch whose account has not appeared yet
    pub const PATCH_ATTEMPTS: u32 = 5;
    /// Initial backoff between patch attempts in seconds
    pub const PATCH_BACKOFF_SECS: u64 = 2;
    /// Maximum backoff between patch attempts in seconds (exponential backoff cap)
    pub const PATCH_MAX_BACKOFF_SECS: u64 = 30;
    /// How long a delete may take before a recreate is attempted anyway
    pub const DELETE_TIMEOUT_SECS: u64 = 60;
}
