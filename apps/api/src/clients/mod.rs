pub mod binance;
pub mod coingecko;
pub mod nowpayments;
pub mod sendgrid;
