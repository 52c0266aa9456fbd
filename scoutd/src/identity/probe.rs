use std::io::Read;
use std::net::IpAddr;
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};

/// The three ways of learning a hardware address for an IP, in the order enrichment
/// tries them. Implementations are blocking and must bound their own run time.
pub trait HardwareAddressSource: Send + Sync {
    /// Active layer-2 query (ARP request)
    fn active_probe(&self, ip: IpAddr) -> Option<String>;

    /// Read the OS neighbor table
    fn neighbor_table(&self, ip: IpAddr) -> Option<String>;

    /// Send a single best-effort packet so the neighbor table gets populated
    fn reachability_probe(&self, ip: IpAddr);
}

/// Uses `arping`, `/proc/net/arp`, `ip neigh`, `arp` and `ping`.
/// Missing tools and failures simply produce no result.
pub struct SystemProbe {
    timeout: Duration,
}

impl SystemProbe {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    fn timeout_secs(&self) -> String {
        self.timeout.as_secs().max(1).to_string()
    }
}

impl HardwareAddressSource for SystemProbe {
    fn active_probe(&self, ip: IpAddr) -> Option<String> {
        if !ip.is_ipv4() || cfg!(windows) {
            return None;
        }
        let ip_arg = ip.to_string();
        let output = run_with_timeout(
            Command::new("arping").args(["-c", "1", "-w", &self.timeout_secs(), &ip_arg]),
            self.timeout,
        )?;
        parse_arping(&output)
    }

    fn neighbor_table(&self, ip: IpAddr) -> Option<String> {
        if cfg!(target_os = "linux") {
            return match ip {
                IpAddr::V4(_) => {
                    let table = std::fs::read_to_string("/proc/net/arp").ok()?;
                    parse_proc_net_arp(&table, ip)
                }
                IpAddr::V6(_) => {
                    let ip_arg = ip.to_string();
                    let output = run_with_timeout(
                        Command::new("ip").args(["-6", "neigh", "show", &ip_arg]),
                        self.timeout,
                    )?;
                    parse_ip_neigh(&output)
                }
            };
        }

        let args: &[&str] = if cfg!(windows) { &["-a"] } else { &["-an"] };
        let output = run_with_timeout(Command::new("arp").args(args), self.timeout)?;
        parse_arp_a(&output, ip)
    }

    fn reachability_probe(&self, ip: IpAddr) {
        let ip_arg = ip.to_string();
        let mut command = Command::new("ping");
        if cfg!(windows) {
            command.args(["-n", "1", "-w", "1000", &ip_arg]);
        } else {
            command.args(["-c", "1", "-W", "1", &ip_arg]);
        }
        let _ = run_with_timeout(&mut command, self.timeout);
    }
}

/// Run a command, killing it once `timeout` elapses. Returns stdout on clean exit.
/// Stdout is drained on its own thread so a chatty command never stalls on a full pipe.
fn run_with_timeout(command: &mut Command, timeout: Duration) -> Option<String> {
    let mut child = command
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .map_err(|e| tracing::debug!("Failed to spawn {:?}: {}", command.get_program(), e))
        .ok()?;

    let mut pipe = child.stdout.take()?;
    let reader = std::thread::spawn(move || {
        let mut stdout = String::new();
        pipe.read_to_string(&mut stdout).map(|_| stdout)
    });

    let deadline = Instant::now() + timeout;
    let status = loop {
        match child.try_wait() {
            Ok(Some(status)) => break Some(status),
            Ok(None) if Instant::now() < deadline => {
                std::thread::sleep(Duration::from_millis(25));
            }
            Ok(None) => {
                tracing::debug!("{:?} timed out after {:?}", command.get_program(), timeout);
                let _ = child.kill();
                let _ = child.wait();
                break None;
            }
            Err(e) => {
                tracing::debug!("Failed to wait for {:?}: {}", command.get_program(), e);
                let _ = child.kill();
                let _ = child.wait();
                break None;
            }
        }
    };

    let stdout = reader.join().ok()?.ok()?;
    status?.success().then_some(stdout)
}

/// `Unicast reply from 192.168.1.1 [AA:BB:CC:DD:EE:FF]  0.713ms`
pub fn parse_arping(output: &str) -> Option<String> {
    output
        .lines()
        .filter(|line| line.contains("reply from"))
        .find_map(|line| {
            let start = line.find('[')? + 1;
            let end = start + line[start..].find(']')?;
            Some(line[start..end].to_string())
        })
}

/// Linux `/proc/net/arp`:
/// `IP address  HW type  Flags  HW address  Mask  Device`
pub fn parse_proc_net_arp(table: &str, ip: IpAddr) -> Option<String> {
    let wanted = ip.to_string();
    table.lines().skip(1).find_map(|line| {
        let fields: Vec<&str> = line.split_whitespace().collect();
        match fields.as_slice() {
            [addr, _hw_type, flags, mac, ..] if *addr == wanted && *flags != "0x0" => {
                Some(mac.to_string())
            }
            _ => None,
        }
    })
}

/// `fe80::1 dev eth0 lladdr aa:bb:cc:dd:ee:ff REACHABLE`
pub fn parse_ip_neigh(output: &str) -> Option<String> {
    output.lines().find_map(|line| {
        let mut fields = line.split_whitespace();
        fields.find(|f| *f == "lladdr")?;
        fields.next().map(str::to_string)
    })
}

/// BSD `arp -an`: `? (192.168.1.1) at aa:bb:cc:dd:ee:ff on en0 ifscope [ethernet]`
/// Windows `arp -a`: `  192.168.1.1     aa-bb-cc-dd-ee-ff     dynamic`
pub fn parse_arp_a(output: &str, ip: IpAddr) -> Option<String> {
    let wanted = ip.to_string();
    let bracketed = format!("({})", wanted);
    output.lines().find_map(|line| {
        let fields: Vec<&str> = line.split_whitespace().collect();
        if let Some(pos) = fields.iter().position(|f| *f == bracketed) {
            let at = fields[pos..].iter().position(|f| *f == "at")? + pos;
            return fields.get(at + 1).map(|m| m.to_string());
        }
        match fields.as_slice() {
            [addr, mac, ..] if *addr == wanted => Some(mac.to_string()),
            _ => None,
        }
    })
}
