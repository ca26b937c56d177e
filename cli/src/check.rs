use std::fmt;

use anyhow::bail;
use clap::{self, Args};

use droidex::adb::DeviceEntry;
use droidex::{remediation, transport, Context, ExecAdb};

use crate::printer::{print_remediation, status::*};

#[derive(Args)]
pub struct Check {}

enum Status {
    Failed(String),
    Passed(String),
    Skipped,
}

struct Info {
    name: &'static str,
    status: Status,
}

impl fmt::Display for Info {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match &self.status {
            Status::Failed(why) => write!(f, "{}: {} ({})", FAIL, self.name, why),
            Status::Passed(what) => write!(f, "{}: {} ({})", OK, self.name, what),
            Status::Skipped => write!(f, "{}: {} (skipped)", MEH, self.name),
        }
    }
}

fn device_description(dev: &DeviceEntry) -> String {
    format!("{} ready", dev.serial)
}

impl Check {
    pub fn run(&self, ctx: &dyn Context) -> anyhow::Result<()> {
        let adb = ExecAdb::new(ctx)?;
        log::info!("checking adb at {}", adb.bin());

        let mut failed = false;

        let transport_info = match transport::check_available(&adb) {
            Ok(version) => Info {
                name: "adb",
                status: Status::Passed(format!("{}: {}", adb.bin(), version)),
            },
            Err(e) => {
                println!(
                    "{}",
                    Info {
                        name: "adb",
                        status: Status::Failed(e.to_string()),
                    }
                );
                println!(
                    "{}",
                    Info {
                        name: "device",
                        status: Status::Skipped,
                    }
                );
                print_remediation("To fix adb:", &remediation::transport());
                bail!("adb is not usable");
            }
        };
        println!("{}", transport_info);

        match transport::check_device_connected(&adb) {
            Ok(dev) => println!(
                "{}",
                Info {
                    name: "device",
                    status: Status::Passed(device_description(&dev)),
                }
            ),
            Err(e) => {
                failed = true;
                println!(
                    "{}",
                    Info {
                        name: "device",
                        status: Status::Failed(e.to_string()),
                    }
                );
                print_remediation("To connect a device:", &remediation::device());
            }
        }

        if failed {
            bail!("device is not ready for acquisition");
        }
        Ok(())
    }
}
