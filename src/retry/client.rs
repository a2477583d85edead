// Copyright 2017 CoreOS, Inc.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! client
//!
//! this is a thin layer over a blocking http get request. every call is a
//! single attempt; retrying is left to the caller through `Retry`, so that
//! one backoff policy can cover both the transport and whatever the caller
//! does with the response. It takes care of deserializing responses and
//! handles headers in a sane way.

use std::io::Read;

use anyhow::{anyhow, Context, Result};
use reqwest::{self, blocking, header, Method};
use slog::{debug, info, Logger};

pub trait Deserializer {
    fn deserialize<T, R>(&self, r: R) -> Result<T>
    where
        T: for<'de> serde::Deserialize<'de>,
        R: Read;
    fn content_type(&self) -> header::HeaderValue;
}

#[derive(Debug, Clone, Copy)]
pub struct Json;

impl Deserializer for Json {
    fn deserialize<T, R>(&self, r: R) -> Result<T>
    where
        T: serde::de::DeserializeOwned,
        R: Read,
    {
        serde_json::from_reader(r).context("failed json deserialization")
    }
    fn content_type(&self) -> header::HeaderValue {
        header::HeaderValue::from_static("application/json")
    }
}

#[derive(Debug, Clone)]
pub struct Client {
    client: blocking::Client,
    log: Logger,
    #[cfg(test)]
    mock_base_url: Option<String>,
}

impl Client {
    pub fn try_new(log: Logger) -> Result<Self> {
        let client = blocking::Client::builder()
            .build()
            .context("failed to initialize client")?;
        Ok(Client {
            client,
            log,
            #[cfg(test)]
            mock_base_url: None,
        })
    }

    #[cfg(test)]
    pub fn mock_base_url(mut self, base_url: String) -> Self {
        self.mock_base_url = Some(base_url);
        self
    }

    pub fn get<D>(&self, d: D, url: String) -> RequestBuilder<'_, D>
    where
        D: Deserializer,
    {
        RequestBuilder {
            url,
            d,
            client: self,
            headers: header::HeaderMap::new(),
        }
    }
}

pub struct RequestBuilder<'a, D>
where
    D: Deserializer,
{
    url: String,
    d: D,
    client: &'a Client,
    headers: header::HeaderMap,
}

impl<D> RequestBuilder<'_, D>
where
    D: Deserializer,
{
    pub fn header(mut self, k: header::HeaderName, v: header::HeaderValue) -> Self {
        self.headers.append(k, v);
        self
    }

    /// Perform the request once and deserialize a `200 OK` body.
    pub fn send<T>(self) -> Result<T>
    where
        T: for<'de> serde::Deserialize<'de>,
    {
        let log = &self.client.log;
        let url = self.parse_url()?;
        let mut req = blocking::Request::new(Method::GET, url);
        req.headers_mut().extend(self.headers);
        req.headers_mut()
            .insert(header::ACCEPT, self.d.content_type());

        info!(log, "fetching"; "url" => req.url().as_str());
        let resp = match self.client.client.execute(req) {
            Ok(resp) => resp,
            Err(e) => {
                info!(log, "failed to fetch"; "error" => %e);
                return Err(anyhow!(e).context("failed to fetch"));
            }
        };

        let status = resp.status();
        let body = resp.text().context("failed to read response body")?;
        debug!(log, "response received"; "status" => %status, "body" => &body);

        if status != reqwest::StatusCode::OK {
            info!(log, "failed to fetch"; "status" => %status);
            return Err(anyhow!("failed to fetch: {}", status));
        }

        info!(log, "fetch successful");
        self.d
            .deserialize(body.as_bytes())
            .context("failed to deserialize data")
    }

    fn parse_url(&self) -> Result<reqwest::Url> {
        #[allow(unused_mut)]
        let mut url = reqwest::Url::parse(self.url.as_str()).context("failed to parse uri")?;
        #[cfg(test)]
        if let Some(mock_base_url) = &self.client.mock_base_url {
            let base_url =
                reqwest::Url::parse(mock_base_url).context("failed to parse mock base URL")?;
            url.set_scheme(base_url.scheme())
                .map_err(|_| anyhow!("failed to update URL scheme"))?;
            let host = base_url
                .host()
                .context("mock base URL doesn't have a host")?
                .to_string();
            url.set_host(Some(&host))
                .context("failed to update URL host")?;
            url.set_port(base_url.port())
                .map_err(|_| anyhow!("failed to update URL port"))?;
        }
        Ok(url)
    }
}
