// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2025 Daniel Negri
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

use clap::{Parser, Subcommand};
use csv::{ReaderBuilder, Trim, Writer};
use receipt_split::server::{self, AppState};
use receipt_split::{
    BillContext, ItemId, OwedMap, ParsedItem, Settings, check_price, compute_owed, round_cents,
};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::fs::File;
use std::io::{BufReader, Read, Write};
use std::path::PathBuf;
use std::process;
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

/// Receipt Split - Split a shared bill and settle it
///
/// Serves the HTTP API, or splits a bill CSV offline and writes what each
/// participant owes to stdout.
#[derive(Parser, Debug)]
#[command(name = "receipt-split")]
#[command(about = "Split receipts with proportional tax and tip", long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the HTTP API
    Serve {
        /// Overrides `server.port` from the settings
        #[arg(long)]
        port: Option<u16>,
    },
    /// Split a bill CSV and print the owed amounts
    ///
    /// Expected format: name,quantity,price,assigned_to
    /// Example: receipt-split split bill.csv --tax 10 --tip 20 --payer Bob > owed.csv
    Split {
        #[arg(value_name = "FILE")]
        input: PathBuf,
        /// Tax percentage
        #[arg(long, default_value = "0")]
        tax: Decimal,
        /// Tip percentage, applied to subtotal plus tax
        #[arg(long, default_value = "0")]
        tip: Decimal,
        /// Participant who paid the bill
        #[arg(long)]
        payer: Option<String>,
    },
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    let settings = match Settings::new() {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("Error loading settings: {}", e);
            process::exit(1);
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(settings.log_filter())),
        )
        .with_writer(std::io::stderr)
        .init();

    match args.command {
        Command::Serve { port } => run_server(settings, port).await,
        Command::Split {
            input,
            tax,
            tip,
            payer,
        } => run_split(input, tax, tip, payer.as_deref()),
    }
}

async fn run_server(mut settings: Settings, port: Option<u16>) {
    if let Some(port) = port {
        settings.server.port = port;
    }

    let address = settings.server.address();
    let listener = match TcpListener::bind(&address).await {
        Ok(listener) => listener,
        Err(e) => {
            eprintln!("Error binding '{}': {}", address, e);
            process::exit(1);
        }
    };

    let state = AppState::from_settings(&settings);
    if let Err(e) = server::serve(listener, state).await {
        eprintln!("Server error: {}", e);
        process::exit(1);
    }
}

fn run_split(input: PathBuf, tax: Decimal, tip: Decimal, payer: Option<&str>) {
    let file = match File::open(&input) {
        Ok(f) => f,
        Err(e) => {
            eprintln!("Error opening file '{}': {}", input.display(), e);
            process::exit(1);
        }
    };

    let bill = match read_bill(BufReader::new(file), tax, tip, payer) {
        Ok(bill) => bill,
        Err(e) => {
            eprintln!("Error reading bill: {}", e);
            process::exit(1);
        }
    };

    if let Err(e) = write_owed(&compute_owed(&bill), std::io::stdout()) {
        eprintln!("Error writing output: {}", e);
        process::exit(1);
    }
}

/// Raw CSV record matching the input format.
///
/// Fields: `name, quantity, price, assigned_to`
#[derive(Debug, Deserialize)]
struct CsvRecord {
    name: String,
    quantity: u32,
    price: Decimal,
    #[serde(default)]
    assigned_to: Option<String>,
}

/// Builds a bill from a CSV reader.
///
/// Participants are registered in order of first appearance in
/// `assigned_to`, followed by the payer if nobody assigned them anything.
/// Malformed rows and rows with an out of range price are skipped.
///
/// # CSV Format
///
/// ```csv
/// name,quantity,price,assigned_to
/// Coffee,1,4.00,Alice
/// Muffin,1,3.00,Alice
/// Water,1,0.00,
/// ```
///
/// # Errors
///
/// Returns an error if the reader fails or tax/tip/payer are rejected.
fn read_bill<R: Read>(
    reader: R,
    tax: Decimal,
    tip: Decimal,
    payer: Option<&str>,
) -> Result<BillContext, Box<dyn std::error::Error>> {
    let mut rdr = ReaderBuilder::new()
        .trim(Trim::All)
        .flexible(true)
        .has_headers(true)
        .from_reader(reader);

    let mut rows = Vec::new();
    for result in rdr.deserialize::<CsvRecord>() {
        match result {
            Ok(record) => match check_price(record.price) {
                Ok(_) => rows.push(record),
                Err(e) => tracing::warn!(item = %record.name, error = %e, "skipping row"),
            },
            Err(e) => tracing::warn!(error = %e, "skipping malformed row"),
        }
    }

    let mut bill = BillContext::new();
    bill.set_tax_percent(tax)?;
    bill.set_tip_percent(tip)?;

    let mut assignments = Vec::with_capacity(rows.len());
    let mut items = Vec::with_capacity(rows.len());
    for record in rows {
        let assigned_to = record.assigned_to.filter(|name| !name.is_empty());
        if let Some(name) = &assigned_to {
            if !bill.participants().contains(name) {
                bill.add_participant(name)?;
            }
        }
        assignments.push(assigned_to);
        items.push(ParsedItem::new(record.name, record.quantity, record.price));
    }
    bill.replace_items(items);

    for (index, name) in assignments.iter().enumerate() {
        if name.is_some() {
            bill.assign(&ItemId::from_index(index), name.as_deref())?;
        }
    }

    if let Some(payer) = payer {
        if !bill.participants().contains(payer.trim()) {
            bill.add_participant(payer)?;
        }
        bill.set_payer(payer.trim())?;
    }
    Ok(bill)
}

/// Writes `participant,owed` rows rounded to cents.
///
/// The header is written even when nobody owes anything.
fn write_owed<W: Write>(owed: &OwedMap, writer: W) -> Result<(), csv::Error> {
    let mut wtr = Writer::from_writer(writer);

    wtr.write_record(["participant", "owed"])?;
    for (participant, amount) in owed.iter() {
        wtr.write_record([participant, format!("{:.2}", round_cents(amount)).as_str()])?;
    }

    wtr.flush()?;
    Ok(())
}
