//! Shared test utilities for core module tests
//!
//! Fixtures are modeled on real captures taken before and after a container
//! stack starts. This module is only compiled in test mode.

use crate::core::diff::RulesetDiffer;
use crate::core::render::{RenderOptions, render_nft};
use crate::elevation::{NFT_COMMAND_ENV, NO_ELEVATION_ENV};
use std::sync::Mutex;

/// Mutex for tests that need exclusive access to environment variables.
///
/// Hold it across any test that sets, removes or depends on the
/// `NFTDELTA_*` variables, including [`setup_mock_nft`] callers.
///
/// # Example
///
/// ```ignore
/// let _guard = ENV_VAR_MUTEX.lock().unwrap();
/// unsafe {
///     std::env::set_var("NFTDELTA_ELEVATION_METHOD", "sudo");
/// }
/// // ... test with custom env state ...
/// unsafe {
///     std::env::remove_var("NFTDELTA_ELEVATION_METHOD");
/// }
/// ```
pub static ENV_VAR_MUTEX: Mutex<()> = Mutex::new(());

/// Points live captures at `tests/mock_nft.sh` and disables elevation.
///
/// Other tests may clear these variables, so call it in every test that
/// captures, while holding [`ENV_VAR_MUTEX`].
pub fn setup_mock_nft() {
    let mock_path = format!("{}/tests/mock_nft.sh", env!("CARGO_MANIFEST_DIR"));
    // SAFETY: callers hold ENV_VAR_MUTEX
    unsafe {
        std::env::set_var(NFT_COMMAND_ENV, &mock_path);
        std::env::set_var(NO_ELEVATION_ENV, "1");
    }
}

/// Host ruleset before the stack starts
pub const DOCKER_BASELINE: &str = r#"table inet filter { # handle 1
	chain input { # handle 1
		type filter hook input priority filter; policy drop;
		ct state established,related counter packets 1021 bytes 88213 accept # handle 4
		iifname "lo" accept # handle 5
		tcp dport 22 counter packets 12 bytes 720 accept # handle 6
	}
}
table ip nat { # handle 2
	chain PREROUTING { # handle 1
		type nat hook prerouting priority dstnat; policy accept;
	}

	chain POSTROUTING { # handle 2
		type nat hook postrouting priority srcnat; policy accept;
	}
}
table ip filter { # handle 3
	chain INPUT { # handle 1
		type filter hook input priority filter; policy accept;
		counter packets 10 bytes 800 # handle 2
	}
}
"#;

/// Host ruleset after the stack started: one published port, one masquerade
/// rule (both via iptables-nft) and an empty DOCKER-USER chain
pub const DOCKER_COMPLETE: &str = r#"table inet filter { # handle 1
	chain input { # handle 1
		type filter hook input priority filter; policy drop;
		ct state established,related counter packets 2040 bytes 170001 accept # handle 4
		iifname "lo" accept # handle 5
		tcp dport 22 counter packets 30 bytes 1800 accept # handle 6
	}
}
table ip nat { # handle 2
	chain PREROUTING { # handle 1
		type nat hook prerouting priority dstnat; policy accept;
	}

	chain DOCKER { # handle 5
		iifname != "br-icinga" tcp dport 8080 counter packets 0 bytes 0 xt target "DNAT" to:172.20.0.3:8080 # handle 11
	}

	chain POSTROUTING { # handle 2
		type nat hook postrouting priority srcnat; policy accept;
		ip saddr 172.20.0.0/16 oifname != "br-icinga" counter packets 4 bytes 240 xt target "MASQUERADE" # handle 12
	}
}
table ip filter { # handle 3
	chain INPUT { # handle 1
		type filter hook input priority filter; policy accept;
		counter packets 99 bytes 8000 # handle 2
	}

	chain DOCKER-USER { # handle 7
	}
}
"#;

/// Diffs two captures with default options and renders the result as nft text.
pub fn rendered_diff(baseline: &str, complete: &str) -> String {
    let outcome = RulesetDiffer::default()
        .diff_texts(baseline, complete)
        .unwrap();
    render_nft(&outcome.document, &RenderOptions::default())
}
