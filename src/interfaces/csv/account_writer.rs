use crate::domain::account::Account;
use crate::error::Result;
use rust_decimal::Decimal;
use serde::Serialize;
use std::io::Write;

#[derive(Serialize)]
struct AccountRecord<'a> {
    id: i64,
    owner: &'a str,
    currency: &'a str,
    name: &'a str,
    balance: Decimal,
    deleted: bool,
}

impl<'a> From<&'a Account> for AccountRecord<'a> {
    fn from(account: &'a Account) -> Self {
        Self {
            id: account.id.0,
            owner: &account.owner,
            currency: &account.currency,
            name: &account.name,
            // Stores differ in the scale they return; print the shortest form.
            balance: account.balance.0.normalize(),
            deleted: account.is_deleted,
        }
    }
}

/// Writes account rows as CSV with columns `id,owner,currency,name,balance,deleted`.
pub struct AccountWriter<W: Write> {
    writer: csv::Writer<W>,
}

impl<W: Write> AccountWriter<W> {
    pub fn new(sink: W) -> Self {
        Self {
            writer: csv::Writer::from_writer(sink),
        }
    }

    pub fn write_accounts<'a, I>(&mut self, accounts: I) -> Result<()>
    where
        I: IntoIterator<Item = &'a Account>,
    {
        let mut wrote_any = false;
        for account in accounts {
            self.writer.serialize(AccountRecord::from(account))?;
            wrote_any = true;
        }
        if !wrote_any {
            self.writer
                .write_record(["id", "owner", "currency", "name", "balance", "deleted"])?;
        }
        self.writer.flush()?;
        Ok(())
    }
}
