//! Narrative selection and per-failure templates

use super::{DebugCommand, Section, Template};
use crate::models::FailureRecord;

/// Closed set of failure narratives
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Narrative {
    CrashLoop,
    ImagePull,
    OutOfMemory,
    ConfigError,
    RunContainerError,
    InvalidImageName,
    Generic,
}

impl Narrative {
    /// Pick the narrative for a failure reason
    pub fn for_reason(reason: &str) -> Self {
        match reason {
            "CrashLoopBackOff" => Narrative::CrashLoop,
            "ImagePullBackOff" | "ErrImagePull" => Narrative::ImagePull,
            "OOMKilled" => Narrative::OutOfMemory,
            "CreateContainerConfigError" => Narrative::ConfigError,
            "RunContainerError" => Narrative::RunContainerError,
            "InvalidImageName" => Narrative::InvalidImageName,
            _ => Narrative::Generic,
        }
    }

    pub(crate) fn template(self, record: &FailureRecord) -> Template {
        match self {
            Narrative::CrashLoop => crash_loop(record),
            Narrative::ImagePull => image_pull(record),
            Narrative::OutOfMemory => out_of_memory(record),
            Narrative::ConfigError => config_error(record),
            Narrative::RunContainerError => run_container_error(record),
            Narrative::InvalidImageName => invalid_image_name(record),
            Narrative::Generic => generic(record),
        }
    }
}

/// `-n <namespace>` plus the pod name, shared by most kubectl lines
struct Target<'a> {
    pod: &'a str,
    ns: &'a str,
    container: &'a str,
}

impl<'a> Target<'a> {
    fn of(record: &'a FailureRecord) -> Self {
        Self {
            pod: &record.workload.name,
            ns: &record.workload.namespace,
            container: &record.container,
        }
    }

    fn describe(&self) -> String {
        format!("kubectl describe pod {} -n {}", self.pod, self.ns)
    }

    fn events(&self) -> String {
        format!(
            "kubectl get events -n {} --field-selector involvedObject.name={}",
            self.ns, self.pod
        )
    }

    fn sorted_events(&self) -> String {
        format!("{} --sort-by='.lastTimestamp'", self.events())
    }

    fn logs(&self, flags: &str) -> String {
        let mut line = format!("kubectl logs {} -n {} -c {}", self.pod, self.ns, self.container);
        if !flags.is_empty() {
            line.push(' ');
            line.push_str(flags);
        }
        line
    }

    fn yaml(&self) -> String {
        format!("kubectl get pod {} -n {} -o yaml", self.pod, self.ns)
    }

    fn jsonpath(&self, path: &str) -> String {
        format!(
            "kubectl get pod {} -n {} -o jsonpath='{}'",
            self.pod, self.ns, path
        )
    }
}

fn image_of(record: &FailureRecord) -> &str {
    if record.image.is_empty() {
        "<image>"
    } else {
        &record.image
    }
}

fn crash_loop(record: &FailureRecord) -> Template {
    let t = Target::of(record);

    Template {
        summary: "Your container keeps crashing and restarting.".to_string(),
        meaning: &[
            "The application inside the container starts but then immediately fails.",
            "Kubernetes tried to restart it multiple times but it keeps crashing.",
        ],
        show_message: false,
        fixes: &[
            "Check application logs for startup errors",
            "Verify environment variables and configuration",
            "Test the container image locally",
            "Check dependencies (database, APIs, etc.)",
        ],
        commands: vec![
            DebugCommand::new("View recent logs (last 50 lines)", t.logs("--tail=50")),
            DebugCommand::new("View logs from previous crash", t.logs("--previous")),
            DebugCommand::new(
                "View all logs with timestamps",
                format!(
                    "kubectl logs {} -n {} --timestamps=true --all-containers=true",
                    t.pod, t.ns
                ),
            ),
            DebugCommand::new("Stream logs in real-time", t.logs("-f")),
            DebugCommand::new("Get detailed pod information", t.describe()),
            DebugCommand::new("Check pod events (last activities)", t.sorted_events()),
            DebugCommand::new("Get pod YAML configuration", t.yaml()),
            DebugCommand::new(
                "Check environment variables",
                format!("kubectl exec {} -n {} -c {} -- env", t.pod, t.ns, t.container),
            ),
            DebugCommand::new(
                "Try to exec into container (if it stays up long enough)",
                format!(
                    "kubectl exec -it {} -n {} -c {} -- /bin/sh",
                    t.pod, t.ns, t.container
                ),
            ),
            DebugCommand::new(
                "Check resource usage",
                format!("kubectl top pod {} -n {}", t.pod, t.ns),
            ),
        ],
        sections: vec![Section::bullets(
            "📊 COMMON CAUSES",
            &[
                "Missing required environment variables",
                "Database connection failures",
                "External service unavailable",
                "Configuration file errors",
                "Application code bugs",
                "Port already in use",
                "File system permissions",
            ],
        )],
    }
}

fn image_pull(record: &FailureRecord) -> Template {
    let t = Target::of(record);
    let image = image_of(record);

    Template {
        summary: "Kubernetes cannot download your container image.".to_string(),
        meaning: &[
            "The image specified in your deployment doesn't exist, has the wrong name,",
            "or Kubernetes doesn't have permission to pull it from the registry.",
        ],
        show_message: true,
        fixes: &[
            "Verify the image name and tag are correct",
            "Check if the image exists in the registry",
            "Ensure image pull secrets are configured correctly",
            "Verify registry credentials are valid",
        ],
        commands: vec![
            DebugCommand::new(
                "Check pod description for image details",
                format!("{} | grep -A5 'Image'", t.describe()),
            ),
            DebugCommand::new(
                "View detailed error message",
                format!("{} | grep -A10 'Events'", t.describe()),
            ),
            DebugCommand::new("Get pod events", t.events()),
            DebugCommand::new(
                "Check if image pull secret exists",
                format!("kubectl get secrets -n {}", t.ns),
            ),
            DebugCommand::new(
                "Describe the image pull secret",
                format!("kubectl get secret <secret-name> -n {} -o yaml", t.ns),
            ),
            DebugCommand::multi(
                "Test pulling the image locally (if using Docker)",
                vec![
                    "# First, confirm the image name from the pod:".to_string(),
                    t.jsonpath("{.spec.containers[*].image}"),
                    "# Then try pulling it:".to_string(),
                    format!("docker pull {}", image),
                ],
            ),
            DebugCommand::new(
                "Check deployment/pod spec",
                format!("{} | grep -A5 'image:'", t.yaml()),
            ),
            DebugCommand::new(
                "List all image pull secrets in namespace",
                format!(
                    "kubectl get serviceaccount default -n {} -o yaml | grep -A3 'imagePullSecrets'",
                    t.ns
                ),
            ),
        ],
        sections: vec![
            Section::bullets(
                "📊 COMMON CAUSES",
                &[
                    "Typo in image name or tag",
                    "Image doesn't exist in registry",
                    "Private registry without credentials",
                    "Expired or invalid image pull secret",
                    "Wrong registry URL",
                    "Tag 'latest' doesn't exist",
                    "Network issues accessing registry",
                ],
            ),
            Section::new(
                "💡 CREATE IMAGE PULL SECRET",
                vec![
                    "kubectl create secret docker-registry regcred \\".to_string(),
                    "  --docker-server=<registry> \\".to_string(),
                    "  --docker-username=<username> \\".to_string(),
                    "  --docker-password=<password> \\".to_string(),
                    "  --docker-email=<email> \\".to_string(),
                    format!("  -n {}", t.ns),
                ],
            ),
        ],
    }
}

fn out_of_memory(record: &FailureRecord) -> Template {
    let t = Target::of(record);

    Template {
        summary: "Your container ran out of memory (OOM = Out Of Memory).".to_string(),
        meaning: &[
            "The application used more memory than the limit you set.",
            "Kubernetes killed it to prevent affecting other pods on the node.",
        ],
        show_message: false,
        fixes: &[
            "Increase memory limits in your deployment",
            "Fix memory leaks in your application",
            "Optimize memory usage",
            "Use memory profiling tools",
        ],
        commands: vec![
            DebugCommand::new(
                "Check current memory limits",
                t.jsonpath("{.spec.containers[*].resources}"),
            ),
            DebugCommand::new(
                "View actual memory usage (if metrics-server is installed)",
                format!("kubectl top pod {} -n {} --containers", t.pod, t.ns),
            ),
            DebugCommand::new(
                "Check historical resource usage",
                format!("{} | grep -A5 'Limits\\|Requests'", t.describe()),
            ),
            DebugCommand::new(
                "View OOM events",
                format!("kubectl get events -n {} --field-selector reason=OOMKilling", t.ns),
            ),
            DebugCommand::new(
                "Check node memory pressure",
                "kubectl describe nodes | grep -A5 'Memory'".to_string(),
            ),
            DebugCommand::new(
                "Get pod restart count",
                t.jsonpath("{.status.containerStatuses[*].restartCount}"),
            ),
            DebugCommand::new("View logs before OOM kill", t.logs("--previous --tail=100")),
        ],
        sections: vec![
            Section::new(
                "📊 HOW TO INCREASE MEMORY",
                vec![
                    String::new(),
                    "Edit your deployment/pod spec:".to_string(),
                    String::new(),
                    "resources:".to_string(),
                    "  requests:".to_string(),
                    "    memory: \"256Mi\"  # Minimum guaranteed".to_string(),
                    "  limits:".to_string(),
                    "    memory: \"512Mi\"  # Maximum allowed (INCREASE THIS)".to_string(),
                    String::new(),
                    "Then apply changes:".to_string(),
                    format!("kubectl edit deployment <deployment-name> -n {}", t.ns),
                ],
            ),
            Section::bullets(
                "📊 COMMON CAUSES",
                &[
                    "Memory limit set too low",
                    "Memory leak in application",
                    "Loading too much data at once",
                    "Inefficient caching",
                    "Large file processing",
                ],
            ),
        ],
    }
}

fn config_error(record: &FailureRecord) -> Template {
    let t = Target::of(record);

    Template {
        summary: "There's a problem with your container configuration.".to_string(),
        meaning: &[
            "Kubernetes found an error in your pod/container configuration",
            "before it could even start the container.",
        ],
        show_message: true,
        fixes: &[
            "Verify all ConfigMaps and Secrets exist",
            "Check volume mount paths are correct",
            "Ensure environment variables reference valid resources",
            "Validate YAML syntax",
        ],
        commands: vec![
            DebugCommand::new("Get detailed error description", t.describe()),
            DebugCommand::new(
                "Check if referenced ConfigMaps exist",
                format!("kubectl get configmaps -n {}", t.ns),
            ),
            DebugCommand::new(
                "Check if referenced Secrets exist",
                format!("kubectl get secrets -n {}", t.ns),
            ),
            DebugCommand::new("View pod YAML to find configuration issues", t.yaml()),
            DebugCommand::new("Check volume mounts", t.jsonpath("{.spec.volumes}")),
        ],
        sections: vec![Section::bullets(
            "📊 COMMON CAUSES",
            &[
                "Missing ConfigMap or Secret",
                "Wrong ConfigMap/Secret key name",
                "Invalid volume mount path",
                "Incorrect environment variable reference",
            ],
        )],
    }
}

fn run_container_error(record: &FailureRecord) -> Template {
    let t = Target::of(record);

    Template {
        summary: "Kubernetes couldn't start your container.".to_string(),
        meaning: &[
            "The image was pulled and the pod was scheduled, but the container",
            "runtime failed while creating or starting the process.",
        ],
        show_message: true,
        fixes: &[
            "Check the entrypoint and command exist in the image",
            "Verify volume mounts and security context settings",
            "Review the runtime error in the pod events",
        ],
        commands: vec![
            DebugCommand::new("Get detailed pod information", t.describe()),
            DebugCommand::new("Check pod events", t.events()),
            DebugCommand::new(
                "Check container command and args",
                t.jsonpath("{.spec.containers[*].command}"),
            ),
        ],
        sections: vec![Section::bullets(
            "📊 COMMON CAUSES",
            &[
                "Entrypoint binary missing or not executable",
                "Mount path conflicts with image contents",
                "Security context not permitted by the runtime",
            ],
        )],
    }
}

fn invalid_image_name(record: &FailureRecord) -> Template {
    let t = Target::of(record);

    Template {
        summary: "The container image name is invalid or malformed.".to_string(),
        meaning: &["Kubernetes could not parse the image reference, so nothing was pulled."],
        show_message: true,
        fixes: &[
            "Check the image reference for typos or illegal characters",
            "Use the form registry/repository:tag or repository@sha256:digest",
        ],
        commands: vec![DebugCommand::new(
            "Check the image name",
            t.jsonpath("{.spec.containers[*].image}"),
        )],
        sections: vec![Section::bullets(
            "📊 COMMON CAUSES",
            &[
                "Uppercase letters in the repository name",
                "Unresolved template variable in the image field",
                "Empty or missing tag after ':'",
            ],
        )],
    }
}

fn generic(record: &FailureRecord) -> Template {
    let t = Target::of(record);

    Template {
        summary: record.reason.clone(),
        meaning: &[],
        show_message: true,
        fixes: &[],
        commands: vec![
            DebugCommand::new("Get detailed pod information", t.describe()),
            DebugCommand::new("View logs", t.logs("")),
            DebugCommand::new("View previous logs (if restarted)", t.logs("--previous")),
            DebugCommand::new("Check events", t.sorted_events()),
        ],
        sections: Vec::new(),
    }
}
